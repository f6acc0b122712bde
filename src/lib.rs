//! Synthetic multi-asset market-sentiment simulation with physical-analogy
//! analytics: regime chains, stochastic sentiment, narrative events, trails,
//! flow fields, spin networks and cross-asset correlation.

pub mod alerts;
pub mod config;
pub mod correlation;
pub mod error;
pub mod feed;
pub mod field;
pub mod generator;
pub mod ingress;
pub mod logging;
pub mod narrative;
pub mod noise;
pub mod observer;
pub mod regime;
pub mod runtime;
pub mod simulation;
pub mod spin;
pub mod stats;
pub mod trail;
pub mod types;

pub use config::SimConfig;
pub use error::ConfigError;
pub use feed::{SentimentFeed, Subscription};
pub use simulation::{MarketSimulator, Simulation};
pub use types::{Regime, SentimentReading};
