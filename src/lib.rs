pub mod assistant;
pub mod config;
pub mod control;
pub mod engine;
pub mod hotkeys;
pub mod keyboard;
pub mod keymap;
pub mod model;
pub mod planner;
pub mod playback;
pub mod sim;
pub mod timing;
pub mod trace;
pub mod typo;
