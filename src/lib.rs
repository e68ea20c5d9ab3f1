//! # Persona Sift
//!
//! Persona-driven section extraction and ranking for PDF collections.
//!
//! Given a folder of PDFs and a request naming a persona and a task, Persona
//! Sift splits each document into heading-delimited sections, ranks them by
//! embedding similarity to the query, removes sections that break hard
//! constraints stated in the task ("vegetarian", "gluten-free", "without
//! nuts"), and writes the top results as JSON.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────┐   ┌──────────────┐   ┌──────────────────────────┐   ┌──────────┐
//! │  inputs  │──▶│   pdf_runs   │──▶│ persona-sift-core        │──▶│  output  │
//! │ PDFs+req │   │ lopdf → runs │   │ extract → rank → filter  │   │   JSON   │
//! └──────────┘   └──────────────┘   └────────────┬─────────────┘   └──────────┘
//!                                                │
//!                                         ┌──────┴──────┐
//!                                         │  embedding  │
//!                                         │ hash/local  │
//!                                         └─────────────┘
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing and validation |
//! | [`inputs`] | PDF discovery and request loading |
//! | [`pdf_runs`] | PDF content streams → positioned text runs |
//! | [`pdf_fonts`] | Font encodings and `ToUnicode` maps → text |
//! | [`embedding`] | Embedding provider implementations |
//! | [`output`] | Result assembler and JSON report |
//! | [`run`] | The end-to-end `sift run` command |
//! | [`inspect`] | `sift sections` / `sift constraints` audit commands |
//! | [`logging`] | Tracing subscriber setup |

pub mod config;
pub mod embedding;
pub mod inputs;
pub mod inspect;
pub mod logging;
pub mod output;
pub mod pdf_fonts;
pub mod pdf_runs;
pub mod run;
