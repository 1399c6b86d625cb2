pub mod chat;
pub mod context;
pub mod history;
pub mod onboard;
pub mod ping;
pub mod runtime;
pub mod tools;
