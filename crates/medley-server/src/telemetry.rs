use std::sync::atomic::{AtomicU64, Ordering};

/// Process-wide counters, exposed as a plain-text exposition at
/// `/metrics`. `reconcile_failed_total` is the one to alarm on: every
/// increment is a captured charge with no booking behind it.
#[derive(Debug, Default)]
pub struct RequestMetrics {
    requests_total: AtomicU64,
    reservations_total: AtomicU64,
    reservations_rejected_total: AtomicU64,
    reconcile_applied_total: AtomicU64,
    reconcile_duplicate_total: AtomicU64,
    reconcile_failed_total: AtomicU64,
    webhook_rejected_total: AtomicU64,
}

impl RequestMetrics {
    pub fn bump_requests(&self) {
        self.requests_total.fetch_add(1, Ordering::Relaxed);
    }

    pub fn bump_reservations(&self) {
        self.reservations_total.fetch_add(1, Ordering::Relaxed);
    }

    pub fn bump_reservations_rejected(&self) {
        self.reservations_rejected_total.fetch_add(1, Ordering::Relaxed);
    }

    pub fn bump_reconcile_applied(&self) {
        self.reconcile_applied_total.fetch_add(1, Ordering::Relaxed);
    }

    pub fn bump_reconcile_duplicate(&self) {
        self.reconcile_duplicate_total.fetch_add(1, Ordering::Relaxed);
    }

    pub fn bump_reconcile_failed(&self) {
        self.reconcile_failed_total.fetch_add(1, Ordering::Relaxed);
    }

    pub fn bump_webhook_rejected(&self) {
        self.webhook_rejected_total.fetch_add(1, Ordering::Relaxed);
    }

    #[must_use]
    pub fn reconcile_failed_total(&self) -> u64 {
        self.reconcile_failed_total.load(Ordering::Relaxed)
    }

    #[must_use]
    pub fn render_text(&self) -> String {
        let mut out = String::new();
        for (name, value) in [
            ("medley_requests_total", &self.requests_total),
            ("medley_reservations_total", &self.reservations_total),
            (
                "medley_reservations_rejected_total",
                &self.reservations_rejected_total,
            ),
            ("medley_reconcile_applied_total", &self.reconcile_applied_total),
            (
                "medley_reconcile_duplicate_total",
                &self.reconcile_duplicate_total,
            ),
            ("medley_reconcile_failed_total", &self.reconcile_failed_total),
            ("medley_webhook_rejected_total", &self.webhook_rejected_total),
        ] {
            out.push_str(&format!(
                "# TYPE {name} counter\n{name} {}\n",
                value.load(Ordering::Relaxed)
            ));
        }
        out
    }
}
