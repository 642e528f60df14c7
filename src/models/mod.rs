// src/models/mod.rs

pub mod attempt;
pub mod course;
pub mod game;
pub mod progress;
pub mod question;
pub mod user;
