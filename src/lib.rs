// GestureGate - Serial IMU Gesture Gateway
//
// Reads accelerometer samples from a device over a serial link, classifies
// them in fixed time windows, checks the labels against an expected gesture
// sequence and answers the device with a feedback command per window.

pub mod classify;
pub mod config;
pub mod drivers;
pub mod ei;
pub mod error;
pub mod events;
pub mod ingest;
pub mod scheduler;
pub mod sequence;
pub mod tasks;
