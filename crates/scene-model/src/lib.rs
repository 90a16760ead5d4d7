//! Reelsmith Scene Model
//!
//! Defines the data contracts for a single short-clip render:
//! - **Canvas:** The fixed 720x1280 portrait output frame and its encode contract
//! - **Scene:** Background source, text and emoji layers, audio, target duration
//! - **Request:** The dashboard wire format and the reported render outcome
//!
//! All coordinates are pixel positions on the canvas. A scene is built per
//! job, consumed once by the render engine, and never persisted.

pub mod canvas;
pub mod color;
pub mod request;
pub mod scene;

pub use canvas::*;
pub use color::*;
pub use request::*;
pub use scene::*;
