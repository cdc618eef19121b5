use crate::api::{ApiResult, ExportRequest, ExportStatus, Gateway, GenerationRequest, GenerationStatus};
use crate::models::{ExportArtifact, ExportFormat, ExportQuality, GeneratedPresentation, Task, TaskStatus};
use leptos::logging::{log, warn};

/// The endpoints behind one class of server-side job.
#[allow(async_fn_in_trait)]
pub trait JobKind: 'static {
    type Request;
    /// Everything needed to address the job after submission.
    type Ticket: Clone + 'static;
    type Output: Clone + 'static;

    const NAME: &'static str;

    async fn submit<G: Gateway>(
        gateway: &G,
        req: &Self::Request,
    ) -> ApiResult<(Self::Ticket, Task<Self::Output>)>;

    async fn status<G: Gateway>(gateway: &G, ticket: &Self::Ticket) -> ApiResult<Task<Self::Output>>;

    async fn cancel<G: Gateway>(gateway: &G, ticket: &Self::Ticket) -> ApiResult<()>;
}

/// AI deck generation.
pub struct GenerationJob;

impl GenerationJob {
    fn task_from(s: GenerationStatus) -> Task<GeneratedPresentation> {
        let result = match (s.status, s.result.as_ref()) {
            (TaskStatus::Completed, Some(r)) => GeneratedPresentation::from_result(r),
            _ => None,
        };
        if s.status == TaskStatus::Completed && result.is_none() {
            warn!("generation {} completed without a presentation id", s.task_id);
        }

        Task {
            id: s.task_id,
            status: s.status,
            progress: s.progress.min(100),
            message: s.message.unwrap_or_default(),
            estimated_time: None,
            result,
            error: s.error_message,
        }
    }
}

impl JobKind for GenerationJob {
    type Request = GenerationRequest;
    type Ticket = String;
    type Output = GeneratedPresentation;

    const NAME: &'static str = "generation";

    async fn submit<G: Gateway>(
        gateway: &G,
        req: &GenerationRequest,
    ) -> ApiResult<(String, Task<GeneratedPresentation>)> {
        req.validate()?;
        let accepted = gateway.submit_generation(req).await?;
        log!("generation {} accepted: {}", accepted.task_id, accepted.message);

        let mut task = Task::new(accepted.task_id.clone(), accepted.status);
        task.message = accepted.message;
        task.estimated_time = accepted.estimated_time;
        Ok((accepted.task_id, task))
    }

    async fn status<G: Gateway>(
        gateway: &G,
        task_id: &String,
    ) -> ApiResult<Task<GeneratedPresentation>> {
        Ok(Self::task_from(gateway.generation_status(task_id).await?))
    }

    async fn cancel<G: Gateway>(gateway: &G, task_id: &String) -> ApiResult<()> {
        gateway.cancel_generation(task_id).await
    }
}

/// Export of one presentation to a file.
#[derive(Clone, Debug, PartialEq)]
pub struct ExportOrder {
    pub presentation_id: String,
    pub format: ExportFormat,
    pub quality: Option<ExportQuality>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ExportTicket {
    pub presentation_id: String,
    pub task_id: String,
}

pub struct ExportJob;

impl ExportJob {
    /// Export statuses carry no progress figure.
    fn task_from(s: ExportStatus) -> Task<ExportArtifact> {
        let done = s.status == TaskStatus::Completed;
        let result = match (done, s.download_url) {
            (true, Some(url)) if !url.is_empty() => Some(ExportArtifact {
                download_url: url,
                expires_at: s.expires_at,
            }),
            _ => None,
        };

        let mut task = Task::new(s.export_task_id, s.status);
        task.progress = if done { 100 } else { 0 };
        task.result = result;
        if s.status == TaskStatus::Failed {
            task.error = Some("export failed".to_string());
        }
        task
    }
}

impl JobKind for ExportJob {
    type Request = ExportOrder;
    type Ticket = ExportTicket;
    type Output = ExportArtifact;

    const NAME: &'static str = "export";

    async fn submit<G: Gateway>(
        gateway: &G,
        order: &ExportOrder,
    ) -> ApiResult<(ExportTicket, Task<ExportArtifact>)> {
        let req = ExportRequest {
            format: order.format,
            quality: order.quality,
        };
        let status = gateway.submit_export(&order.presentation_id, &req).await?;
        let ticket = ExportTicket {
            presentation_id: order.presentation_id.clone(),
            task_id: status.export_task_id.clone(),
        };
        Ok((ticket, Self::task_from(status)))
    }

    async fn status<G: Gateway>(
        gateway: &G,
        ticket: &ExportTicket,
    ) -> ApiResult<Task<ExportArtifact>> {
        let s = gateway
            .export_status(&ticket.presentation_id, &ticket.task_id)
            .await?;
        Ok(Self::task_from(s))
    }

    /// There is no remote cancel for exports; polling just stops.
    async fn cancel<G: Gateway>(_gateway: &G, ticket: &ExportTicket) -> ApiResult<()> {
        log!("export {} abandoned locally", ticket.task_id);
        Ok(())
    }
}
