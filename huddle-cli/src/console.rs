use async_trait::async_trait;
use colored::*;
use huddle_core::{ParticipantId, PresenceRecord, RoomId};
use huddle_peer::media::TrackKind;
use huddle_peer::negotiation::NegotiationState;
use huddle_peer::RoomObserver;

/// Prints room events to stdout.
pub struct ConsoleObserver;

#[async_trait]
impl RoomObserver for ConsoleObserver {
    async fn on_participant_joined(&self, record: &PresenceRecord) {
        println!(
            "{} {} ({})",
            "+ joined".green().bold(),
            record.display_name.bold(),
            record.participant_id
        );
    }

    async fn on_participant_left(&self, participant: &ParticipantId) {
        println!("{} {}", "- left".yellow().bold(), participant);
    }

    async fn on_connection_state(&self, participant: &ParticipantId, state: NegotiationState) {
        let label = match state {
            NegotiationState::Connected => state.to_string().green(),
            NegotiationState::Failed => state.to_string().red(),
            NegotiationState::Closed => state.to_string().dimmed(),
            _ => state.to_string().cyan(),
        };
        println!("  {} {}", participant, label);
    }

    async fn on_connection_lost(&self, participant: &ParticipantId, reason: &str) {
        println!("{} {}: {}", "! lost".red().bold(), participant, reason);
    }

    async fn on_remote_track(&self, participant: &ParticipantId, kind: TrackKind) {
        println!("  {} {} from {}", "track".blue(), kind, participant);
    }

    async fn on_local_media(&self, kind: TrackKind, enabled: bool) {
        let state = if enabled { "on".green() } else { "off".red() };
        println!("  local {} {}", kind, state);
    }

    async fn on_room_lost(&self, room: &RoomId, reason: &str) {
        println!("{} {}: {}", "! room lost".red().bold(), room, reason);
        println!("{}", "Press q to leave".dimmed());
    }
}
