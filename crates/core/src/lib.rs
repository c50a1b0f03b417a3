//! # Paperflow Core
//!
//! The "Brain" of Paperflow - stage agents, session persistence and the
//! pipeline orchestrator that turns a paper title into a researched, drafted,
//! edited and similarity-screened report.
//!
//! ## Architecture
//!
//! - `generation/` - Text generation client with live and offline backends
//! - `skills/` - Stage agents (Researcher, Writer, Editor, Plagiarism)
//! - `tools/` - Draft sections and the similarity scorer
//! - `state/` - SQLite-backed session store
//! - `orchestrator/` - Session state machine, events and coordinator
//! - `models` - Provider and pipeline configuration
//!
//! ## Usage
//!
//! ```rust,ignore
//! use paperflow_core::models::PaperflowConfig;
//! use paperflow_core::orchestrator::Orchestrator;
//!
//! let orchestrator = Orchestrator::from_config(&PaperflowConfig::default())?;
//! let session_id = orchestrator.submit("Graph Neural Networks for Drug Discovery")?;
//! let session = orchestrator.wait(&session_id).await?;
//! ```

pub mod generation;
pub mod models;
pub mod orchestrator;
pub mod skills;
pub mod state;
pub mod tools;
