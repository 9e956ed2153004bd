use utoipa::OpenApi;

#[derive(OpenApi)]
/// Aggregated OpenAPI specification for Neon Guess Back.
#[openapi(
    paths(
        crate::routes::health::healthcheck,
        crate::routes::rooms::list_rooms,
        crate::routes::rooms::get_room,
        crate::routes::websocket::ws_handler,
    ),
    components(
        schemas(
            crate::dto::health::HealthResponse,
            crate::dto::room::RoomsResponse,
            crate::dto::room::RoomSummary,
            crate::dto::room::RoomStatus,
            crate::dto::ws::ParticipantInboundMessage,
            crate::dto::ws::CreateRoomMessage,
            crate::dto::ws::RoomSnapshot,
            crate::dto::ws::RejectionNotice,
        )
    ),
    tags(
        (name = "health", description = "Health check endpoints"),
        (name = "rooms", description = "Read-only views of live rooms"),
        (name = "participants", description = "WebSocket operations for players"),
    )
)]
pub struct ApiDoc;
