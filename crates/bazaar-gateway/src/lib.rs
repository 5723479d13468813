//! Change feed: pushes store changes to connected clients.

pub mod connection;
pub mod dispatcher;
pub mod feed;
