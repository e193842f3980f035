//! Session authentication for the residence portal.
//!
//! Residents log in with their house number and password, receive an
//! opaque bearer token in the `session_token` cookie, and every other
//! route resolves that token back to a [`models::user::UserProfile`].

pub mod app;
pub mod config;
pub mod db;
pub mod error;
pub mod state;

pub mod crypto {
    pub mod password;
    pub mod token;
}

pub mod models {
    pub mod session;
    pub mod user;
}

pub mod repositories {
    pub mod memory;
    pub mod postgres;
    pub mod store;
    pub mod throttle;
}

pub mod services {
    pub mod auth;
}

pub mod handlers {
    pub mod auth;
}

pub mod middleware_layer {
    pub mod auth;
    pub mod rate_limit;
}

pub mod validation {
    pub mod auth;
}
