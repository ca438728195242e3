//! Server-side room management and join-token minting via `livekit-api`.

use livekit_api::access_token::{AccessToken, VideoGrants};
use livekit_api::services::room::{CreateRoomOptions, RoomClient};

use crate::error::GatewayError;
use crate::protocol_constants::ROOM_EMPTY_TIMEOUT_SECS;
use crate::state::LiveKitConfig;

/// Thin wrapper over the LiveKit server APIs the gateway needs: idempotent
/// room creation/deletion and join-token minting.
pub struct RoomService {
    client: RoomClient,
    api_key: String,
    api_secret: String,
}

impl RoomService {
    pub fn new(config: &LiveKitConfig) -> Self {
        Self {
            client: RoomClient::with_api_key(&config.url, &config.api_key, &config.api_secret),
            api_key: config.api_key.clone(),
            api_secret: config.api_secret.clone(),
        }
    }

    /// Creates `room_name` if it doesn't already exist, with a 60s empty
    /// timeout. Idempotent: LiveKit treats create-on-existing as a no-op.
    pub async fn ensure_room(&self, room_name: &str) -> Result<(), GatewayError> {
        self.client
            .create_room(
                room_name,
                CreateRoomOptions {
                    empty_timeout: ROOM_EMPTY_TIMEOUT_SECS as u32,
                    ..Default::default()
                },
            )
            .await
            .map_err(|e| GatewayError::RoomCreateFailed(e.to_string()))?;
        Ok(())
    }

    pub async fn delete_room(&self, room_name: &str) -> Result<(), GatewayError> {
        self.client
            .delete_room(room_name)
            .await
            .map_err(|e| GatewayError::Internal(format!("room delete failed: {e}")))?;
        Ok(())
    }

    /// Lists participant identities currently in `room_name`, used by the
    /// "verify by listing participants" agent-join fallback.
    pub async fn list_participant_identities(&self, room_name: &str) -> Result<Vec<String>, GatewayError> {
        let participants = self
            .client
            .list_participants(room_name)
            .await
            .map_err(|e| GatewayError::Internal(format!("list participants failed: {e}")))?;
        Ok(participants.into_iter().map(|p| p.identity).collect())
    }

    /// Mints a join token granting room-join, room-create, publish, and
    /// subscribe, carrying `{mac, uuid, room_type}` attributes.
    pub fn mint_join_token(
        &self,
        room_name: &str,
        identity: &str,
        mac: &str,
        uuid: &str,
        room_type: &str,
    ) -> Result<String, GatewayError> {
        let grants = VideoGrants {
            room: room_name.to_string(),
            room_join: true,
            room_create: true,
            can_publish: true,
            can_subscribe: true,
            ..Default::default()
        };

        AccessToken::with_api_key(&self.api_key, &self.api_secret)
            .with_identity(identity)
            .with_grants(grants)
            .with_attributes(
                [
                    ("mac".to_string(), mac.to_string()),
                    ("uuid".to_string(), uuid.to_string()),
                    ("room_type".to_string(), room_type.to_string()),
                ]
                .into_iter()
                .collect(),
            )
            .to_jwt()
            .map_err(|e| GatewayError::RoomJoinFailed(e.to_string()))
    }
}
