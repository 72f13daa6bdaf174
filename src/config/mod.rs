//! Configuration management.

mod settings;

pub use settings::{
    CallSettings, DatabaseSettings, JwtSettings, RedisSettings, ServerSettings, Settings,
    SipSettings, WebSocketSettings, MIN_JWT_SECRET_LENGTH,
};
