//! InkFE: an infinite-canvas vector painting engine with a tiled, multi-core
//! CPU rasterizer.
//!
//! Strokes live in integer canvas coordinates; a [`canvas::CanvasView`]
//! maps them to the screen and [`raster::Renderer`] turns them into pixels.
//! [`project::Project`] ties input, history, rendering and saving together.

#![allow(clippy::too_many_arguments)]

#[macro_use]
pub mod logger;

pub mod arena;
pub mod canvas;
pub mod cli;
pub mod color;
pub mod components;
pub mod geometry;
pub mod gpu;
pub mod input;
pub mod io;
pub mod project;
pub mod raster;
pub mod settings;
