use std::sync::LazyLock;

use regex::Regex;

use crate::context::Context;
use crate::error::Error;
use crate::error::ErrorKind;
use crate::error::Result;
use crate::parse_context::ParseContext;
use crate::tag::ControlSignal;
use crate::tag::Renderable;
use crate::tokenizer::Token;
use crate::tokenizer::Tokenizer;
use crate::variable::Variable;

static FULL_TOKEN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?s)\A\{%-?(\s*)(#|\w+)(\s*)(.*?)-?%\}\z").expect("valid regex")
});
static LIQUID_TAG_TOKEN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?s)\A\s*(#|\w+)\s*(.*?)\z").expect("valid regex"));
static CONTENT_OF_VARIABLE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?s)\A\{\{-?(.*?)-?\}\}\z").expect("valid regex"));

const TAG_END_PATTERN: &str = r"/\%\}/";
const VARIABLE_END_PATTERN: &str = r"/\}\}/";

/// A tag the body parser does not know. The enclosing block decides what it
/// means: its own end delimiter, an intermediate tag such as `else`, or an
/// error.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnknownTag {
    pub name: String,
    pub markup: String,
}

#[derive(Debug)]
pub enum Node {
    Text(String),
    Variable(Variable),
    Tag(Box<dyn Renderable>),
}

impl Node {
    #[must_use]
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Node::Text(text) => Some(text),
            _ => None,
        }
    }

    #[must_use]
    pub fn is_blank(&self) -> bool {
        match self {
            Node::Text(text) => text.trim().is_empty(),
            Node::Variable(_) => false,
            Node::Tag(tag) => tag.is_blank(),
        }
    }
}

/// An ordered list of text, variables and tags.
#[derive(Debug)]
pub struct BlockBody {
    nodelist: Vec<Node>,
    blank: bool,
}

impl Default for BlockBody {
    fn default() -> Self {
        Self::new()
    }
}

impl BlockBody {
    #[must_use]
    pub fn new() -> Self {
        Self {
            nodelist: Vec::new(),
            blank: true,
        }
    }

    #[must_use]
    pub fn nodelist(&self) -> &[Node] {
        &self.nodelist
    }

    #[must_use]
    pub fn is_blank(&self) -> bool {
        self.blank
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.nodelist.is_empty()
    }

    /// Parse nodes until a tag this body cannot handle, or the end of input
    /// (`None`).
    pub fn parse(
        &mut self,
        tokenizer: &mut Tokenizer,
        parse_context: &mut ParseContext,
    ) -> Result<Option<UnknownTag>> {
        parse_context.set_line_number(tokenizer.line_number());
        if tokenizer.is_liquid_tag() {
            self.parse_for_liquid_tag(tokenizer, parse_context)
        } else {
            self.parse_for_document(tokenizer, parse_context)
        }
    }

    fn parse_for_document(
        &mut self,
        tokenizer: &mut Tokenizer,
        parse_context: &mut ParseContext,
    ) -> Result<Option<UnknownTag>> {
        while let Some(token) = tokenizer.shift() {
            match token {
                Token::Tag(raw) => {
                    self.whitespace_handler(&raw, parse_context);
                    let Some(caps) = FULL_TOKEN.captures(&raw) else {
                        return Err(parse_context.syntax_error(
                            "tag_termination",
                            &[("token", &raw), ("tag_end", TAG_END_PATTERN)],
                        ));
                    };
                    let name = &caps[2];
                    let markup = &caps[4];

                    if let Some(line) = parse_context.line_number() {
                        let newlines = caps[1].matches('\n').count() + caps[3].matches('\n').count();
                        parse_context.set_line_number(Some(line + newlines));
                    }

                    if name == "liquid" {
                        self.parse_liquid_tag(markup, parse_context)?;
                    } else if let Some(unknown) =
                        self.parse_tag(name, markup, tokenizer, parse_context)?
                    {
                        return Ok(Some(unknown));
                    }
                }
                Token::Variable(raw) => {
                    self.whitespace_handler(&raw, parse_context);
                    let variable = create_variable(&raw, parse_context)?;
                    self.nodelist.push(Node::Variable(variable));
                    self.blank = false;
                }
                Token::Text(mut text) | Token::Line(mut text) => {
                    if parse_context.trim_whitespace {
                        text = text.trim_start().to_owned();
                    }
                    parse_context.trim_whitespace = false;
                    if !text.is_empty() {
                        self.blank &= text.trim().is_empty();
                        self.nodelist.push(Node::Text(text));
                    }
                }
            }
            parse_context.set_line_number(tokenizer.line_number());
        }
        Ok(None)
    }

    fn parse_for_liquid_tag(
        &mut self,
        tokenizer: &mut Tokenizer,
        parse_context: &mut ParseContext,
    ) -> Result<Option<UnknownTag>> {
        while let Some(token) = tokenizer.shift() {
            let line = token.raw();
            if !line.trim().is_empty() {
                let Some(caps) = LIQUID_TAG_TOKEN.captures(line) else {
                    return Ok(Some(UnknownTag {
                        name: line.to_owned(),
                        markup: line.to_owned(),
                    }));
                };
                let (name, markup) = (caps[1].to_owned(), caps[2].to_owned());
                let unknown = if name == "liquid" {
                    let mut nested = Tokenizer::for_liquid_tag(&markup, parse_context.line_number());
                    self.parse_for_liquid_tag(&mut nested, parse_context)?
                } else {
                    self.parse_tag(&name, &markup, tokenizer, parse_context)?
                };
                if unknown.is_some() {
                    return Ok(unknown);
                }
            }
            parse_context.set_line_number(tokenizer.line_number());
        }
        Ok(None)
    }

    /// Parse a registered tag into the nodelist, or hand an unregistered one
    /// back to the caller.
    fn parse_tag(
        &mut self,
        name: &str,
        markup: &str,
        tokenizer: &mut Tokenizer,
        parse_context: &mut ParseContext,
    ) -> Result<Option<UnknownTag>> {
        let Some(parser) = parse_context.environment().tags().get(name) else {
            return Ok(Some(UnknownTag {
                name: name.to_owned(),
                markup: markup.to_owned(),
            }));
        };
        let tag = parser.parse(name, markup, tokenizer, parse_context)?;
        self.blank &= tag.is_blank();
        self.nodelist.push(Node::Tag(tag));
        Ok(None)
    }

    fn parse_liquid_tag(&mut self, markup: &str, parse_context: &mut ParseContext) -> Result<()> {
        let mut tokenizer = Tokenizer::for_liquid_tag(markup, parse_context.line_number());
        match self.parse_for_liquid_tag(&mut tokenizer, parse_context)? {
            Some(unknown) => Err(crate::block::unknown_tag_error(
                &unknown.name,
                "liquid",
                "%}",
                parse_context,
            )),
            None => Ok(()),
        }
    }

    fn whitespace_handler(&mut self, raw: &str, parse_context: &mut ParseContext) {
        let bytes = raw.as_bytes();
        if bytes.get(2) == Some(&b'-') {
            if let Some(Node::Text(previous)) = self.nodelist.last_mut() {
                previous.truncate(previous.trim_end().len());
                if previous.is_empty() {
                    self.nodelist.pop();
                }
            }
        }
        parse_context.trim_whitespace =
            bytes.len() >= 3 && bytes.get(bytes.len() - 3) == Some(&b'-');
    }

    /// Drop whitespace-only text from a blank body.
    pub fn remove_blank_strings(&mut self) {
        if self.blank {
            self.nodelist.retain(|node| !matches!(node, Node::Text(_)));
        }
    }

    /// Render every node in order. Return early with a control signal
    /// from `break` or `continue`.
    pub fn render_to_output_buffer(
        &self,
        context: &mut Context,
        output: &mut String,
    ) -> Result<Option<ControlSignal>> {
        context
            .resource_limits_mut()
            .increment_render_score(self.nodelist.len())?;

        for node in &self.nodelist {
            match node {
                Node::Text(text) => output.push_str(text),
                Node::Variable(variable) => {
                    if let Err(err) = variable.render_to_output_buffer(context, output) {
                        context.rescue_render_node(err, variable.line_number(), false, output)?;
                    }
                }
                Node::Tag(tag) => {
                    if let Some(signal) = render_tag(tag.as_ref(), context, output)? {
                        return Ok(Some(signal));
                    }
                }
            }
            context.resource_limits_mut().increment_write_score(output)?;
        }
        Ok(None)
    }

    /// Render into a fresh string, discarding control signals.
    pub fn render(&self, context: &mut Context) -> Result<String> {
        let mut output = String::new();
        self.render_to_output_buffer(context, &mut output)?;
        Ok(output)
    }
}

fn render_tag(
    tag: &dyn Renderable,
    context: &mut Context,
    output: &mut String,
) -> Result<Option<ControlSignal>> {
    if let Some(name) = tag.tag_name().filter(|name| context.is_tag_disabled(name)) {
        let message = format!(
            "{name} {}",
            context.environment().locale().translate("errors.disabled.tag", &[])
        );
        let rendered = context.handle_error(Error::new(ErrorKind::Disabled, message), tag.line_number())?;
        output.push_str(&rendered);
        return Ok(None);
    }

    match tag.render_to_output_buffer(context, output) {
        Ok(signal) => Ok(signal),
        Err(err) => {
            context.rescue_render_node(err, tag.line_number(), tag.is_blank(), output)?;
            Ok(None)
        }
    }
}

fn create_variable(raw: &str, parse_context: &mut ParseContext) -> Result<Variable> {
    match CONTENT_OF_VARIABLE.captures(raw) {
        Some(caps) => Variable::parse(&caps[1], parse_context),
        None => Err(parse_context.syntax_error(
            "variable_termination",
            &[("token", raw), ("tag_end", VARIABLE_END_PATTERN)],
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::environment::Environment;
    use crate::parse_context::ParseOptions;

    fn parse(source: &str) -> Result<(BlockBody, Option<UnknownTag>)> {
        let mut tokenizer = Tokenizer::new(source, true);
        let mut parse_context = ParseContext::new(Environment::global(), &ParseOptions::default());
        let mut body = BlockBody::new();
        let unknown = body.parse(&mut tokenizer, &mut parse_context)?;
        Ok((body, unknown))
    }

    fn render(body: &BlockBody) -> String {
        let mut context = Context::new(Environment::global());
        body.render(&mut context).unwrap()
    }

    #[test]
    fn text_and_variables() {
        let (body, unknown) = parse("Hello {{ 'world' }}!").unwrap();
        assert!(unknown.is_none());
        assert_eq!(body.nodelist().len(), 3);
        assert!(!body.is_blank());
        assert_eq!(render(&body), "Hello world!");
    }

    #[test]
    fn stops_at_unknown_tag() {
        let (body, unknown) = parse("a{% endthing x %}b").unwrap();
        assert_eq!(
            unknown,
            Some(UnknownTag {
                name: "endthing".into(),
                markup: "x ".into(),
            })
        );
        assert_eq!(body.nodelist().len(), 1);
    }

    #[test]
    fn whitespace_only_body_is_blank() {
        let (body, _) = parse("  \n {% assign a = 1 %}\n").unwrap();
        assert!(body.is_blank());
    }

    #[test]
    fn trims_both_sides() {
        let (body, _) = parse("a  {{- 'b' -}}  c").unwrap();
        assert_eq!(render(&body), "abc");
    }

    #[test]
    fn unterminated_variable() {
        let err = parse("{{ x }").unwrap_err();
        assert_eq!(
            err.message(),
            r"Variable '{{ x }' was not properly terminated with regexp: /\}\}/"
        );
    }

    #[test]
    fn unterminated_tag() {
        let err = parse("{% if x").unwrap_err();
        assert_eq!(
            err.message(),
            r"Tag '{% if x' was not properly terminated with regexp: /\%\}/"
        );
    }

    #[test]
    fn liquid_tag_lines() {
        let (body, _) = parse("{% liquid\n  assign x = 'hi'\n  echo x\n%}").unwrap();
        assert_eq!(render(&body), "hi");
    }

    #[test]
    fn liquid_tag_inside_liquid_tag() {
        let (body, _) = parse("{% liquid\n liquid echo 1 %}").unwrap();
        assert_eq!(render(&body), "1");
        let (body, _) = parse("{% liquid\n  assign x = 2\n  liquid echo x\n  echo 3\n%}").unwrap();
        assert_eq!(render(&body), "23");
        let err = parse("{% liquid\n liquid bogus x\n%}").unwrap_err();
        assert_eq!(err.message(), "Unknown tag 'bogus'");
    }

    #[test]
    fn liquid_tag_rejects_unknown_lines() {
        let err = parse("{% liquid\n  echo 1\n  bogus x\n%}").unwrap_err();
        assert_eq!(err.message(), "Unknown tag 'bogus'");
    }

    #[test]
    fn remove_blank_strings_keeps_tags() {
        let (mut body, _) = parse(" {% assign a = 1 %} ").unwrap();
        body.remove_blank_strings();
        assert_eq!(body.nodelist().len(), 1);
        assert!(body.nodelist()[0].as_text().is_none());
    }
}
