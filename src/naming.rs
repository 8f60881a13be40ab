//! Derivation of logical model names from artifact file names.
//!
//! A logical name is the identifier a model file is registered under in the
//! runtime. It is derived purely from the file name, so the same file name
//! always yields the same logical name. Quantization and precision tags are
//! stripped from the end of the name, which keeps the name stable when a
//! file is swapped for a differently-quantized variant of the same model:
//! `llama-3-8b-Q4_K_M.gguf` and `llama-3-8b-F16.gguf` both derive
//! `llama-3-8b`.

use lazy_static::lazy_static;
use regex::Regex;

/// File extension of model artifacts, matched case-insensitively.
pub(crate) const MODEL_EXTENSION: &str = "gguf";

/// Name substituted when derivation yields an empty string.
pub(crate) const FALLBACK_NAME: &str = "model";

lazy_static! {
    // Trailing quantization and precision tags. Anything outside this
    // vocabulary survives into the logical name.
    static ref QUANT_SUFFIX: Regex = Regex::new(
        r"-(q\d+(_[a-z0-9_]+)?|iq\d+(_[a-z0-9_]+)?|f\d+|bf16|fp16|int8|int4)$"
    )
    .unwrap();
    static ref NON_ALPHANUMERIC: Regex = Regex::new(r"[^a-z0-9]+").unwrap();
}

/// Derives the logical name for an artifact file name.
///
/// The name is lowercase, contains only `[a-z0-9-]`, never starts or ends
/// with a hyphen, and is never empty.
pub(crate) fn logical_name(file_name: &str) -> String {
    let lowered = file_name.trim().to_lowercase();

    let stem = lowered.strip_suffix(".gguf").unwrap_or(&lowered);

    let stem = match QUANT_SUFFIX.find(stem) {
        Some(tag) => &stem[..tag.start()],
        None => stem,
    };

    let name = NON_ALPHANUMERIC.replace_all(stem, "-");
    let name = name.trim_matches('-');

    if name.is_empty() {
        FALLBACK_NAME.to_string()
    } else {
        name.to_string()
    }
}
