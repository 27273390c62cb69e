// src/models/mod.rs

pub mod attempt;
pub mod quiz;
pub mod student;
pub mod user;
