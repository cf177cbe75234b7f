//! Quadtodo core - category lists with per-item time tracking.
//!
//! This crate provides the state machine and persistence plumbing behind the
//! four-quadrant (urgency x importance) to-do lists.
//!
//! # Overview
//!
//! Each category owns an ordered list of items. Any item that is not done can
//! have a running timer session; at most one item per category runs at a time
//! and starting another item implicitly stops the previous one. Stopping a
//! session credits the whole elapsed seconds to the item's total and persists
//! it. Every mutation is written through to the configured backend.
//!
//! # Modules
//!
//! - [`types`]: Items, identifiers, categories and partial updates
//! - [`duration`]: Human readable rendering of tracked seconds
//! - [`clock`]: Wall-clock abstraction (system and manual)
//! - [`ticker`]: Cancellable repeating tick processes
//! - [`timer`]: Timer state machine and its transition table
//! - [`store`]: In-memory ordered item collection
//! - [`persistence`]: Local key-value and remote object-store backends
//! - [`auth`]: Identity provider client and shared login session
//! - [`controller`]: Per-category list controller composing all of the above
//! - [`config`]: Configuration from environment variables
//! - [`error`]: Error types

pub mod auth;
pub mod clock;
pub mod config;
pub mod controller;
pub mod duration;
pub mod error;
pub mod persistence;
mod rest;
pub mod store;
pub mod ticker;
pub mod timer;
pub mod types;

pub use auth::{AuthClient, AuthError, Identity, SessionHandle};
pub use clock::{Clock, ManualClock, SystemClock};
pub use config::{BackendKind, Config, ConfigError, RemoteConfig};
pub use controller::{ItemView, ListContext, ListController, TickEvent};
pub use duration::{display_label, humanize};
pub use error::{Result, TodoError, ValidationError};
pub use persistence::{
    AnyBackend, Backend, FileStore, KeyValueStore, LocalBackend, MemoryStore, PersistenceError,
    RemoteBackend,
};
pub use store::{ItemStore, Snapshot};
pub use ticker::{ManualScheduler, Scheduler, TickHandle, TokioScheduler};
pub use timer::{FlushedSession, TimerCommand, TimerEngine, TimerOutcome};
pub use types::{Category, ItemId, ItemPatch, TodoItem};
