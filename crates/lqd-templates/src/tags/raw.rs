use std::sync::LazyLock;

use regex::Regex;

use crate::context::Context;
use crate::error::Result;
use crate::parse_context::ParseContext;
use crate::tag::RenderResult;
use crate::tag::Renderable;
use crate::tokenizer::Tokenizer;

static SYNTAX: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\A\s*\z").expect("valid regex"));
static FULL_TOKEN_POSSIBLY_INVALID: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?s)\A(.*)\{%-?\s*(\w+)\s*(.*)?-?%\}\z").expect("valid regex")
});

/// `{% raw %}...{% endraw %}`. The body is output as written.
#[derive(Debug)]
pub(crate) struct Raw {
    body: String,
}

pub(crate) fn parse(
    tag_name: &str,
    markup: &str,
    tokenizer: &mut Tokenizer,
    parse_context: &mut ParseContext,
) -> Result<Box<dyn Renderable>> {
    if !SYNTAX.is_match(markup) {
        return Err(parse_context.syntax_error("tag_unexpected_args", &[("tag", tag_name)]));
    }

    let mut body = String::new();
    while let Some(token) = tokenizer.shift() {
        let raw = token.raw();
        if let Some(caps) = FULL_TOKEN_POSSIBLY_INVALID.captures(raw) {
            if &caps[2] == "endraw" {
                body.push_str(&caps[1]);
                parse_context.trim_whitespace = raw.len() >= 3 && raw.as_bytes()[raw.len() - 3] == b'-';
                return Ok(Box::new(Raw { body }));
            }
        }
        body.push_str(raw);
    }
    Err(parse_context.syntax_error("tag_never_closed", &[("block_name", tag_name)]))
}

impl Renderable for Raw {
    fn render_to_output_buffer(&self, _: &mut Context, output: &mut String) -> RenderResult {
        output.push_str(&self.body);
        Ok(None)
    }

    fn is_blank(&self) -> bool {
        self.body.is_empty()
    }
}
