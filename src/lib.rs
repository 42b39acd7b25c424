//! ledloom renders animations onto a sculptural LED installation.
//!
//! The pipeline: [`topology`] builds a [`System`] (the LED graph plus its
//! controller wiring) from the installation's data files, [`schedule`]
//! turns a set of keyframed [`Effect`]s into per-frame colors, and the
//! [`executor`] ticks the whole thing at a fixed frame rate through a
//! middleware chain whose tail ends in one or more [`output`]s, either the
//! WebSocket debug viewer or UDP datagrams to the controllers.

#![forbid(unsafe_code)]

pub mod color;
pub mod config;
pub mod ease;
pub mod effect;
pub mod effects;
pub mod error;
pub mod executor;
pub mod output;
pub mod schedule;
pub mod system;
pub mod timeline;
pub mod topology;

pub use color::{Blending, Color};
pub use config::ShowConfig;
pub use ease::Ease;
pub use effect::{Effect, EffectExt};
pub use error::{LoomError, LoomResult};
pub use executor::{Executor, Middleware, MiddlewareFn, Next};
pub use output::Output;
pub use schedule::{EffectsManager, EffectsRunner, Keyframe};
pub use system::{Led, System};
