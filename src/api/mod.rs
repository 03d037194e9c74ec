pub mod client;

pub use client::RoomApiClient;
