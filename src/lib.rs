mod database {
    pub mod actions;
    pub mod error;
    pub mod form;
    pub mod memory;
    pub mod pagination;
    pub mod schema;
    pub mod store;
}
mod authentication {
    pub mod jwt;
    pub mod middleware;
    pub mod permissions;
}
mod cache {
    pub mod cache;
}
pub mod services {
    pub mod catalog;
    pub mod links;
    pub mod recipes;
    pub mod relations;
    pub mod shopping;
    pub mod users;
    pub mod views;
}
pub mod routes {
    pub mod context;
    pub mod filters;
    pub mod handlers;
    pub mod recovery;

    pub use context::{with_context, AppContext};
    pub use filters::routes;
}
pub mod config;
mod constants;
pub mod error;
pub mod storage;

pub use authentication::*;
pub use cache::cache::*;
pub use constants::*;
pub use database::*;
