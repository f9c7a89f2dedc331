//! # seatwatch
//!
//! Watches capacity-limited course sections and keeps trying to reserve a
//! seat until it succeeds or is told to stop.
//!
//! The [`engine::Engine`] runs one monitor per section, tracks them in a
//! [`registry::TaskRegistry`], and reports progress through a bounded
//! [`notification::NotificationLog`]. Reservation attempts go through the
//! [`reserve::Reserve`] trait; [`classify::Classifier`] turns raw replies
//! into outcomes.

pub mod classify;
pub mod config;
pub mod engine;
pub mod error;
pub mod model;
pub mod notification;
pub mod registry;
pub mod reserve;
pub mod telemetry;
