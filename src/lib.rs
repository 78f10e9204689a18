//! Faceless short-video generation service
//!
//! Turns a topic into a narrated vertical video: a remote text model writes
//! the script, a speech engine narrates it, stock footage is fetched per scene
//! and ffmpeg assembles the result with burned-in captions.

pub mod app_state;
pub mod config;
pub mod db;
pub mod models;
pub mod routes;
pub mod services;
