// ABOUTME: Root library module exposing the WhatsApp-facing pieces of jarvis
// ABOUTME: Transport, transcription, webhook server and unattended task runners

pub mod tasks;
pub mod voice;
pub mod webhook;
pub mod whatsapp;

// Re-export the pipeline so the binary and tests need one import path
pub use jarvis_core::{config, metrics, paths, store};
