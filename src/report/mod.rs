//! Output rendering.

pub mod generator;

pub use generator::{
    generate_json, generate_markdown_answer, generate_markdown_envelope, generate_markdown_raw,
    generate_markdown_tasks,
};
