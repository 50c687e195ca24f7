//! Wraps a user prompt with the output-grammar instruction, runs one
//! generation, and hands the reply to the materializer.

use crate::error::Result;
use crate::materializer::{self, Materialized};
use crate::providers::{GenerationOptions, Message, ProviderAdapter};
use std::path::Path;
use tracing::info;

/// Token budget sized for multi-file output.
const GENERATION_MAX_TOKENS: u32 = 8000;

/// The wire contract between this tool and the backend: replies must carry
/// zero or more `FILE:` blocks in exactly this shape. Changing this text is a
/// breaking change to the whole pipeline.
const SYSTEM_PROMPT: &str = r#"You are a code generation assistant. Generate complete, production-ready code based on the user's request.

Output format:
1. Start with a brief description
2. Then output files in this format:

FILE: path/to/file.ext
```language
// code here
```

Example:
FILE: package.json
```json
{
  "name": "my-app"
}
```

FILE: src/index.js
```javascript
console.log('Hello');
```

Generate all necessary files for a complete, working project."#;

pub struct Generator {
    provider: Box<dyn ProviderAdapter>,
}

impl Generator {
    pub fn new(provider: Box<dyn ProviderAdapter>) -> Self {
        Self { provider }
    }

    /// Run one generation for `prompt` and materialize the reply under
    /// `base_dir`. The reply text is delegated untouched; no retries.
    pub async fn generate(&self, prompt: &str, base_dir: &Path) -> Result<Materialized> {
        info!("Generating for prompt: {prompt}");

        let messages = [Message::system(SYSTEM_PROMPT), Message::user(prompt)];
        let options = GenerationOptions {
            max_tokens: GENERATION_MAX_TOKENS,
            ..GenerationOptions::default()
        };

        let response = self.provider.generate(&messages, options).await?;
        materializer::materialize(&response, base_dir)
    }
}
