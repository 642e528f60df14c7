// src/services/mod.rs

pub mod evaluator;
pub mod games;
pub mod grading;
