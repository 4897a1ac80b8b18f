//! Behavioural scenarios for starting, stopping, and automatically shutting
//! down the game server.

mod lifecycle;
