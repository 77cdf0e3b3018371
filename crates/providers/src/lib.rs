pub mod google;
pub mod openai_compat;
pub mod retry;
pub mod traits;

pub use retry::{call_with_retry, RetryNotice, DEFAULT_RETRY_DELAY_SECONDS, MAX_RETRIES};
pub use traits::{InvokeOutcome, ProviderAdapter};

use google::GoogleProvider;
use openai_compat::OpenAiCompatProvider;
use ra_domain::{Provider, ProviderConfig};
use std::sync::Arc;

/// The instruction every session's model calls are grounded with. The Gemini
/// dialect sends it as `systemInstruction` on every request; the Kimi dialect
/// sends no system instruction at all and relies on this text only insofar
/// as it shaped the tool descriptions the model sees.
pub const SYSTEM_PROMPT: &str = "\
You are a read-only code assistant answering questions about a local source \
repository. You must never fabricate file contents, directory structure, or \
code behavior from memory — any claim about what the repository contains or \
does must be backed by a preceding tool call. You have three tools: \
list_dir, search_files, and read_file. Prefer that order: call list_dir \
first to orient yourself, then search_files to locate relevant code, and \
only then read_file on the specific ranges you need. Reply in Chinese prose, \
but keep identifiers, file paths, and code excerpts in their original form.";

/// Build the dialect adapter for a resolved provider configuration.
pub fn make_adapter(config: &ProviderConfig) -> Arc<dyn ProviderAdapter> {
    match config.provider {
        Provider::Gemini => Arc::new(GoogleProvider::new(config)),
        Provider::Kimi => Arc::new(OpenAiCompatProvider::new(config)),
    }
}
