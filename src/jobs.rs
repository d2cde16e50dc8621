use crate::authz::service::AuthorizationService;
use crate::errors::{ParleyError, StoreError};
use chrono::Utc;
use std::sync::Arc;
use tokio_cron_scheduler::{Job, JobScheduler};
use tracing::{error, info};

/// Initialize and start the job scheduler with the inquiry expiry sweep
pub async fn init_scheduler(
    service: Arc<AuthorizationService>,
    schedule: &str,
) -> Result<JobScheduler, ParleyError> {
    let sched = JobScheduler::new()
        .await
        .map_err(|e| ParleyError::Scheduler(format!("Failed to create job scheduler: {}", e)))?;

    let expiry_job = Job::new_async(schedule, move |_uuid, _l| {
        let service = service.clone();
        Box::pin(async move {
            if let Err(e) = run_expiry(&service).await {
                error!("Failed to expire inquiries: {}", e);
            }
        })
    })
    .map_err(|e| {
        ParleyError::Scheduler(format!(
            "Failed to create inquiry expiry job with schedule `{schedule}`: {}",
            e
        ))
    })?;

    sched
        .add(expiry_job)
        .await
        .map_err(|e| ParleyError::Scheduler(format!("Failed to add inquiry expiry job: {}", e)))?;

    sched
        .start()
        .await
        .map_err(|e| ParleyError::Scheduler(format!("Failed to start job scheduler: {}", e)))?;

    info!(%schedule, "Job scheduler started");

    Ok(sched)
}

/// Time out every pending inquiry past its TTL.
pub async fn run_expiry(service: &AuthorizationService) -> Result<u64, StoreError> {
    let count = service.expire_due(Utc::now().timestamp()).await?;
    if count > 0 {
        info!("Timed out {} expired inquiries", count);
    }
    Ok(count)
}
