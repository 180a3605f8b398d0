//! State survives process restart: a fresh connection to the same
//! database file sees everything the previous writer committed.

use chrono::Utc;
use tempfile::TempDir;

use warden::domain::models::action::{ActionStatus, ActionType, RequesterType};
use warden::domain::models::ticket::{Severity, TicketStatus, Violation};
use warden::infrastructure::database::action_repo::NewProposal;
use warden::infrastructure::database::{ActionRepository, DatabaseConnection, TicketRepository};

fn violation() -> Violation {
    Violation {
        invariant_name: "node_down".to_string(),
        message: "node n1 is Down".to_string(),
        first_seen: Utc::now(),
        last_seen: Utc::now(),
        entity_id: Some("n1".to_string()),
        severity: Severity::Critical,
    }
}

#[tokio::test]
async fn tickets_and_retry_queue_survive_reconnect() {
    let dir = TempDir::new().expect("tempdir");
    let url = format!("sqlite:{}/operator.db", dir.path().display());

    let ticket_id;
    let proposal_id;
    {
        let db = DatabaseConnection::new(&url).await.expect("open");
        db.migrate().await.expect("migrate");

        let tickets = TicketRepository::new(db.pool().clone());
        ticket_id = tickets
            .create_or_update(&violation(), None, Some("tick-1"), None)
            .await
            .unwrap()
            .id;

        let actions = ActionRepository::new(db.pool().clone());
        let proposal = actions
            .create_proposal(NewProposal {
                ticket_id: Some(ticket_id),
                action_name: "reload_node".to_string(),
                action_type: ActionType::Subject,
                parameters: serde_json::Map::new(),
                reason: "bring node back".to_string(),
                proposed_by: "agent".to_string(),
                requester_id: "agent:autonomous".to_string(),
                requester_type: RequesterType::Agent,
                agent_id: None,
                workflow_id: None,
                execution_order: 0,
                depends_on_proposal_id: None,
                scheduled_at: None,
                max_retries: 3,
            })
            .await
            .unwrap();
        proposal_id = proposal.id;

        // Leave a failed proposal with a due retry on the queue.
        actions.update_status(proposal_id, ActionStatus::Validated).await.unwrap();
        actions.update_status(proposal_id, ActionStatus::Executing).await.unwrap();
        actions.update_status(proposal_id, ActionStatus::Failed).await.unwrap();
        actions.increment_retry(proposal_id, "node unreachable").await.unwrap();
        actions
            .set_next_retry(proposal_id, Utc::now() - chrono::Duration::seconds(1))
            .await
            .unwrap();

        db.close().await;
    }

    // "Restart": a brand-new connection replays everything from disk.
    let db = DatabaseConnection::new(&url).await.expect("reopen");
    db.migrate().await.expect("migrate is idempotent");

    let tickets = TicketRepository::new(db.pool().clone());
    let ticket = tickets.get(ticket_id).await.unwrap();
    assert_eq!(ticket.status, TicketStatus::Open);
    assert_eq!(ticket.violation_key, "node_down:n1");

    let actions = ActionRepository::new(db.pool().clone());
    let proposal = actions.get_proposal(proposal_id).await.unwrap();
    assert_eq!(proposal.status, ActionStatus::Failed);
    assert_eq!(proposal.retry_count, 1);
    assert_eq!(proposal.last_error.as_deref(), Some("node unreachable"));

    // The retry queue is durable: the restarted agent picks it up.
    let eligible = actions.list_retry_eligible(Utc::now()).await.unwrap();
    assert_eq!(eligible.len(), 1);
    assert_eq!(eligible[0].id, proposal_id);
}
