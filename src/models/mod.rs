// src/models/mod.rs

pub mod exam_record;
pub mod message;
pub mod question;
