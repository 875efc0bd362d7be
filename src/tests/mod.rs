pub mod helpers;
mod workflows;
