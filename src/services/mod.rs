/// Room snapshot construction and fan-out.
pub mod broadcast;
/// OpenAPI documentation generation.
pub mod documentation;
/// Health check service.
pub mod health_service;
/// Read-only room queries served over HTTP.
pub mod room_service;
/// WebSocket connection and message handling service.
pub mod websocket_service;
