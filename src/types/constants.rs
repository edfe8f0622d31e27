/// Event names used on the wire (magic strings layer)
pub mod wire_events {
    pub const CONNECTION: &str = "connection";
    pub const STATE_CHANGE: &str = "state_change";
    pub const ERROR: &str = "error";
    pub const AUTH_ERROR: &str = "auth_error";
    pub const MAX_RECONNECT_ATTEMPTS: &str = "max_reconnect_attempts";
    pub const MESSAGE: &str = "message";
    pub const PING: &str = "ping";
    pub const PONG: &str = "pong";
    pub const AGENT_STATUS: &str = "agent_status";
    pub const TASK_UPDATE: &str = "task_update";
    pub const CODE_GENERATION: &str = "code_generation";
    pub const COLLABORATION: &str = "collaboration";
    pub const NOTIFICATION: &str = "notification";
}

/// Outbound request topics understood by the remote
pub mod request_events {
    pub const JOIN_ROOM: &str = "join_room";
    pub const LEAVE_ROOM: &str = "leave_room";
    pub const GET_AGENT_STATUS: &str = "get_agent_status";
    pub const SUBSCRIBE_TASK: &str = "subscribe_task";
    pub const UNSUBSCRIBE_TASK: &str = "unsubscribe_task";
}

/// Keys under which the credential pair is persisted
pub const ACCESS_TOKEN_KEY: &str = "genesis_auth_token";
pub const RENEWAL_TOKEN_KEY: &str = "genesis_refresh_token";

/// HTTP sub-paths with fixed meaning
pub const RENEWAL_PATH: &str = "/auth/refresh";
pub const LOGIN_PATH: &str = "/auth/login";
pub const LOGOUT_PATH: &str = "/auth/logout";

/// Query parameter carrying the access credential on the socket handshake
pub const SOCKET_TOKEN_PARAM: &str = "token";

/// Default HTTP base address
pub const DEFAULT_API_URL: &str = "http://localhost:8000";

/// Default per-request timeout (milliseconds)
pub const DEFAULT_REQUEST_TIMEOUT: u64 = 30_000;

/// Default number of transient-failure retries per request
pub const DEFAULT_MAX_RETRIES: u32 = 3;

/// Default base for request retry backoff (milliseconds)
pub const DEFAULT_RETRY_BASE: u64 = 1_000;

/// Default socket endpoint
pub const DEFAULT_SOCKET_URL: &str = "ws://localhost:8000/ws";

/// Default reconnect base interval (milliseconds)
pub const DEFAULT_RECONNECT_INTERVAL: u64 = 5_000;

/// Default reconnect attempt budget
pub const DEFAULT_MAX_RECONNECT_ATTEMPTS: u32 = 10;

/// Default ceiling on reconnect delay (milliseconds)
pub const DEFAULT_MAX_RECONNECT_DELAY: u64 = 30_000;

/// Default heartbeat interval (milliseconds)
pub const DEFAULT_HEARTBEAT_INTERVAL: u64 = 30_000;

/// Default socket handshake timeout (milliseconds)
pub const DEFAULT_CONNECT_TIMEOUT: u64 = 20_000;

/// WebSocket close codes
pub const WS_CLOSE_NORMAL: u16 = 1000;
