use anyhow::Result;

use crate::{
    algorithm::SecurityType,
    orders::OrderEvent,
    packet::{AlgorithmStatus, JobIds, LiveResultPacket},
};

/// Realtime channel towards a remote viewer. Called from the dispatcher thread, and once
/// more from whichever thread sends the final result after the dispatcher has stopped.
pub trait Notifier: Send + Sync {
    fn debug_message(&self, job: &JobIds, message: &str) -> Result<()>;

    fn log_message(&self, job: &JobIds, message: &str) -> Result<()>;

    fn runtime_error(&self, job: &JobIds, message: &str, stack_trace: &str) -> Result<()>;

    fn security_types(&self, job: &JobIds, types: &[SecurityType]) -> Result<()>;

    fn algorithm_status(
        &self,
        job: &JobIds,
        algorithm_id: &str,
        status: AlgorithmStatus,
        message: &str,
    ) -> Result<()>;

    fn live_result(&self, packet: &LiveResultPacket) -> Result<()>;

    /// Sinks without an order-event channel keep this default: logged and skipped.
    fn order_event(&self, job: &JobIds, event: &OrderEvent) -> Result<()> {
        log::error!(
            "dispatch.unhandled kind=order_event deploy_id={} order_id={}",
            job.deploy_id,
            event.order_id
        );
        Ok(())
    }
}
