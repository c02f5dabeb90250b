//! Out-of-band pass repairing messages written with the wrong conversation type.
//!
//! Every write is conditional on the row still being misclassified, so the pass converges
//! and can run next to live traffic.

use std::sync::Arc;

use chrono::Utc;
use serde::Serialize;
use tracing::info;

use super::domain::{CaseStatus, ConversationType, REPORT_MARKER};
use super::store::{retry_read, MessageFilter, MessagePatch, ModerationStore, StoreError};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct CorrectionSummary {
    /// Report messages moved into the support inbox.
    pub marker_corrections: usize,
    /// Other admin-thread messages relabelled.
    pub admin_thread_corrections: usize,
    /// Closed report messages put back to open.
    pub reopened: usize,
}

impl CorrectionSummary {
    pub fn total(&self) -> usize {
        self.marker_corrections + self.admin_thread_corrections
    }
}

pub struct ClassificationCorrector<S: ?Sized> {
    store: Arc<S>,
    read_attempts: u32,
}

impl<S> ClassificationCorrector<S>
where
    S: ModerationStore + ?Sized,
{
    pub fn new(store: Arc<S>, read_attempts: u32) -> Self {
        Self {
            store,
            read_attempts,
        }
    }

    pub fn run(&self) -> Result<CorrectionSummary, StoreError> {
        let mut summary = CorrectionSummary::default();
        let relabel = MessagePatch {
            conversation_type: Some(ConversationType::UserToAdmin),
            ..MessagePatch::default()
        };

        let misfiled_reports = MessageFilter::report_signature(REPORT_MARKER)
            .excluding_type(ConversationType::UserToAdmin);
        let reopen = MessagePatch {
            conversation_type: Some(ConversationType::UserToAdmin),
            ..MessagePatch::reopen(Utc::now())
        };
        summary.reopened = self.store.update_messages(
            &misfiled_reports
                .clone()
                .with_case_status(CaseStatus::Closed),
            &reopen,
        )?;
        summary.marker_corrections =
            summary.reopened + self.store.update_messages(&misfiled_reports, &relabel)?;

        let admins = retry_read(self.read_attempts, || self.store.admin_ids())?;
        if !admins.is_empty() {
            let misfiled_threads = MessageFilter::involving_any(admins)
                .excluding_type(ConversationType::UserToAdmin);
            summary.admin_thread_corrections =
                self.store.update_messages(&misfiled_threads, &relabel)?;
        }

        info!(
            marker_corrections = summary.marker_corrections,
            admin_thread_corrections = summary.admin_thread_corrections,
            reopened = summary.reopened,
            "classification pass finished"
        );
        Ok(summary)
    }
}
