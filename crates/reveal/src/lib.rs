//! Card video generation client and reveal job controller.
//!
//! [`controller::RevealController`] is the entry point: it submits a
//! generation request for a [`Subject`](arcana_core::subject::Subject),
//! polls the job through [`scheduler::PollScheduler`] until it resolves,
//! and publishes [`events::DisplayState`] updates for a rendering layer.
//! Superseded or cancelled work is fenced off by [`token`].

pub mod api;
pub mod config;
pub mod controller;
pub mod events;
pub mod messages;
pub mod retry;
pub mod scheduler;
pub mod token;
