//! Live deployment stream over Server-Sent Events.

use std::convert::Infallible;

use axum::extract::State;
use axum::response::sse::{Event, KeepAlive, Sse};
use futures::stream::{Stream, StreamExt};
use tokio_stream::wrappers::errors::BroadcastStreamRecvError;
use tokio_stream::wrappers::BroadcastStream;

use crate::models::deployment::ProcessedDeployment;
use crate::routes::AppState;

/// Every deployment the tracker processes, as `deployment` events.
/// A listener that falls behind skips what it missed.
pub async fn deployment_events(
    State(state): State<AppState>,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    let stream = BroadcastStream::new(state.events.subscribe())
        .filter_map(|msg| futures::future::ready(to_event(msg)))
        .map(Ok::<_, Infallible>);

    Sse::new(stream).keep_alive(KeepAlive::default())
}

fn to_event(msg: Result<ProcessedDeployment, BroadcastStreamRecvError>) -> Option<Event> {
    match msg {
        Ok(deployment) => match serde_json::to_string(&deployment) {
            Ok(data) => Some(Event::default().event("deployment").id(deployment.id).data(data)),
            Err(e) => {
                tracing::error!("Failed to serialize deployment event: {e}");
                None
            }
        },
        Err(BroadcastStreamRecvError::Lagged(skipped)) => {
            tracing::warn!(skipped, "Event listener lagged, dropping deployments");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::deployment::{DeploymentPhases, DeploymentStatus};

    fn deployment() -> ProcessedDeployment {
        ProcessedDeployment {
            id: "gh-7".into(),
            project_id: "web".into(),
            service_id: "web-github-ci".into(),
            provider: "github".into(),
            status: DeploymentStatus::Success,
            workflow_name: Some("Deploy".into()),
            commit_sha: Some("abc".into()),
            branch: Some("main".into()),
            run_url: None,
            started_at: None,
            completed_at: None,
            phases: DeploymentPhases::default(),
        }
    }

    #[test]
    fn lagged_listener_skips_without_event() {
        assert!(to_event(Err(BroadcastStreamRecvError::Lagged(3))).is_none());
        assert!(to_event(Ok(deployment())).is_some());
    }

    #[tokio::test]
    async fn stream_yields_published_deployments() {
        let (tx, rx) = tokio::sync::broadcast::channel(4);
        let mut stream = BroadcastStream::new(rx)
            .filter_map(|msg| futures::future::ready(to_event(msg)));

        tx.send(deployment()).unwrap();
        drop(tx);

        assert!(stream.next().await.is_some());
        assert!(stream.next().await.is_none());
    }
}
