//! Fast-tokenizer artifact dump backed by Hugging Face `tokenizers`.
//!
//! Resolves a tokenizer from a hub identifier or a local path and writes it
//! back out as a single `tokenizer.json`, ready to ship next to a model.

use std::path::{Path, PathBuf};

use tokenizers::{FromPretrainedParameters, Tokenizer};
use tracing::{debug, info};

use crate::error::{GateError, GateResult};

/// File name written into the output directory.
pub const TOKENIZER_FILE: &str = "tokenizer.json";

/// Where a tokenizer identifier resolved to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TokenizerSource {
    /// A `tokenizer.json` on disk.
    File(PathBuf),
    /// A hub repository id such as `openlm-research/open_llama_3b_v2`.
    Hub(String),
}

impl TokenizerSource {
    /// Classify `identifier`: an existing file, a directory holding
    /// `tokenizer.json`, or otherwise a hub repository id.
    pub fn resolve(identifier: &str) -> Self {
        let path = Path::new(identifier);
        if path.is_file() {
            return TokenizerSource::File(path.to_path_buf());
        }
        let candidate = path.join(TOKENIZER_FILE);
        if path.is_dir() && candidate.is_file() {
            return TokenizerSource::File(candidate);
        }
        TokenizerSource::Hub(identifier.to_string())
    }
}

/// Load the tokenizer behind `source`.
pub fn load_tokenizer(source: &TokenizerSource, revision: Option<&str>) -> GateResult<Tokenizer> {
    match source {
        TokenizerSource::File(path) => {
            debug!("Loading tokenizer from {}", path.display());
            Tokenizer::from_file(path).map_err(|e| {
                GateError::Tokenizer(format!("failed to load {}: {}", path.display(), e))
            })
        }
        TokenizerSource::Hub(id) => {
            debug!("Fetching tokenizer {} from the hub", id);
            let params = FromPretrainedParameters {
                revision: revision.unwrap_or("main").to_string(),
                ..Default::default()
            };
            Tokenizer::from_pretrained(id, Some(params))
                .map_err(|e| GateError::Tokenizer(format!("failed to fetch {}: {}", id, e)))
        }
    }
}

/// Fetch `identifier` and save it as `<output_dir>/tokenizer.json`.
///
/// Returns the written path.
pub fn dump_fast_tokenizer(
    identifier: &str,
    output_dir: &Path,
    revision: Option<&str>,
) -> GateResult<PathBuf> {
    let source = TokenizerSource::resolve(identifier);
    let tokenizer = load_tokenizer(&source, revision)?;

    std::fs::create_dir_all(output_dir)?;
    let target = output_dir.join(TOKENIZER_FILE);
    tokenizer.save(&target, true).map_err(|e| {
        GateError::Tokenizer(format!("failed to write {}: {}", target.display(), e))
    })?;

    info!(
        "Saved tokenizer {} ({} tokens) to {}",
        identifier,
        tokenizer.get_vocab_size(true),
        target.display()
    );
    Ok(target)
}
