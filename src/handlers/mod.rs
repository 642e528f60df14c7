// src/handlers/mod.rs

pub mod auth;
pub mod course;
pub mod game;
pub mod quiz;
pub mod students;
