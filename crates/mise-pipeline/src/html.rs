//! Regex-based HTML text extraction and recipe-page heuristics.
//!
//! This is not a DOM parser. It handles the markup recipe sites actually
//! serve: JSON-LD blocks, recipe-plugin card containers, `<article>` and
//! `<body>`; anything stranger degrades to the body text.

use once_cell::sync::Lazy;
use regex::{Captures, Regex};
use serde_json::Value;

static COMMENT_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?s)<!--.*?-->").unwrap());

static DROPPED_BLOCK_RES: Lazy<Vec<Regex>> = Lazy::new(|| {
    ["script", "style", "noscript", "svg"]
        .iter()
        .map(|tag| Regex::new(&format!(r"(?is)<{0}\b[^>]*>.*?</{0}\s*>", tag)).unwrap())
        .collect()
});

static LIST_ITEM_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)<li\b[^>]*>").unwrap());

static BLOCK_TAG_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"(?i)</?(p|div|br|hr|li|ul|ol|h[1-6]|tr|td|th|table|section|article|header|footer|aside|nav|blockquote|pre|figure|figcaption|dl|dt|dd)\b[^>]*>",
    )
    .unwrap()
});

static ANY_TAG_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?s)<[^>]*>").unwrap());

static ENTITY_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"&(#[xX][0-9a-fA-F]+|#[0-9]+|[a-zA-Z]+);").unwrap());

static SPACE_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"[ \t\r\f\v\u{a0}]+").unwrap());

static JSON_LD_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r#"(?is)<script\b[^>]*type\s*=\s*["']application/ld\+json["'][^>]*>(.*?)</script\s*>"#,
    )
    .unwrap()
});

static RECIPE_CARD_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r#"(?is)<(div|section|article|aside)\b[^>]*\bclass\s*=\s*["'][^"']*\b(wprm-recipe|tasty-recipes|mv-create|recipe-card)\b[^"']*["'][^>]*>"#,
    )
    .unwrap()
});

static ARTICLE_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)<article\b[^>]*>").unwrap());

static BODY_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?is)<body\b[^>]*>(.*?)(?:</body\s*>|\z)").unwrap());

static TAG_NAME_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)<(/?)([a-z][a-z0-9]*)\b[^>]*?(/?)>").unwrap());

static META_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?is)<meta\b[^>]*>").unwrap());

static ATTR_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#"(?is)\b([a-z:-]+)\s*=\s*(?:"([^"]*)"|'([^']*)')"#).unwrap());

/// Readable text of an HTML fragment: non-content blocks removed, block tags
/// turned into line breaks, entities decoded, whitespace collapsed.
pub fn to_text(html: &str) -> String {
    let mut s = COMMENT_RE.replace_all(html, " ").into_owned();
    for re in DROPPED_BLOCK_RES.iter() {
        s = re.replace_all(&s, " ").into_owned();
    }
    let s = LIST_ITEM_RE.replace_all(&s, "\n- ");
    let s = BLOCK_TAG_RE.replace_all(&s, "\n");
    let s = ANY_TAG_RE.replace_all(&s, "");
    let s = decode_entities(&s);
    collapse_whitespace(&s)
}

pub fn decode_entities(text: &str) -> String {
    ENTITY_RE
        .replace_all(text, |caps: &Captures| {
            let body = &caps[1];
            let decoded = match body {
                "amp" => Some('&'),
                "lt" => Some('<'),
                "gt" => Some('>'),
                "quot" => Some('"'),
                "apos" => Some('\''),
                "nbsp" => Some(' '),
                "ndash" => Some('-'),
                "mdash" => Some('-'),
                "frac12" => Some('½'),
                "frac14" => Some('¼'),
                "frac34" => Some('¾'),
                "deg" => Some('°'),
                _ if body.starts_with("#x") || body.starts_with("#X") => {
                    u32::from_str_radix(&body[2..], 16).ok().and_then(char::from_u32)
                }
                _ if body.starts_with('#') => body[1..].parse().ok().and_then(char::from_u32),
                _ => None,
            };
            match decoded {
                Some(c) => c.to_string(),
                None => caps[0].to_string(),
            }
        })
        .into_owned()
}

fn collapse_whitespace(text: &str) -> String {
    text.lines()
        .map(|line| SPACE_RE.replace_all(line, " ").trim().to_string())
        .filter(|line| !line.is_empty() && line != "-")
        .collect::<Vec<_>>()
        .join("\n")
}

/// A schema.org `Recipe` found in a JSON-LD block, rendered as plain text.
#[derive(Debug, Clone, PartialEq)]
pub struct JsonLdRecipe {
    pub text: String,
    pub image_url: Option<String>,
}

/// First schema.org `Recipe` in the page's JSON-LD blocks. Handles `@graph`
/// containers, top-level arrays, and `@type` given as a string or a list.
pub fn json_ld_recipe(html: &str) -> Option<JsonLdRecipe> {
    JSON_LD_RE.captures_iter(html).find_map(|caps| {
        let raw = caps.get(1)?.as_str().trim();
        let value: Value = serde_json::from_str(raw).ok()?;
        let node = find_recipe_node(&value)?;
        Some(JsonLdRecipe {
            text: render_recipe_node(node),
            image_url: node.get("image").and_then(image_url),
        })
    })
}

fn find_recipe_node(value: &Value) -> Option<&Value> {
    match value {
        Value::Array(items) => items.iter().find_map(find_recipe_node),
        Value::Object(map) => {
            if is_recipe_type(map.get("@type")) {
                return Some(value);
            }
            map.get("@graph").and_then(find_recipe_node)
        }
        _ => None,
    }
}

fn is_recipe_type(t: Option<&Value>) -> bool {
    match t {
        Some(Value::String(s)) => s.eq_ignore_ascii_case("recipe"),
        Some(Value::Array(types)) => types
            .iter()
            .any(|t| t.as_str().is_some_and(|s| s.eq_ignore_ascii_case("recipe"))),
        _ => false,
    }
}

fn render_recipe_node(node: &Value) -> String {
    let mut out = Vec::new();
    if let Some(name) = node.get("name").and_then(Value::as_str) {
        out.push(clean(name));
    }
    if let Some(desc) = node.get("description").and_then(Value::as_str) {
        out.push(clean(desc));
    }
    if let Some(yield_text) = node.get("recipeYield").and_then(first_text) {
        out.push(format!("Yield: {}", yield_text));
    }
    for (label, key) in [
        ("Prep time", "prepTime"),
        ("Cook time", "cookTime"),
        ("Total time", "totalTime"),
    ] {
        if let Some(t) = node.get(key).and_then(Value::as_str) {
            out.push(format!("{}: {}", label, t));
        }
    }

    let ingredients: Vec<String> = node
        .get("recipeIngredient")
        .or_else(|| node.get("ingredients"))
        .and_then(Value::as_array)
        .map(|items| {
            items
                .iter()
                .filter_map(Value::as_str)
                .map(clean)
                .filter(|s| !s.is_empty())
                .collect()
        })
        .unwrap_or_default();
    if !ingredients.is_empty() {
        out.push("Ingredients:".to_string());
        out.extend(ingredients.into_iter().map(|i| format!("- {}", i)));
    }

    let mut steps = Vec::new();
    if let Some(instructions) = node.get("recipeInstructions") {
        collect_steps(instructions, &mut steps);
    }
    if !steps.is_empty() {
        out.push("Instructions:".to_string());
        out.extend(
            steps
                .into_iter()
                .enumerate()
                .map(|(i, s)| format!("{}. {}", i + 1, s)),
        );
    }

    if let Some(Value::Object(nutrition)) = node.get("nutrition") {
        let facts: Vec<String> = nutrition
            .iter()
            .filter(|(k, _)| !k.starts_with('@'))
            .filter_map(|(k, v)| first_text(v).map(|v| format!("{}: {}", nutrition_label(k), v)))
            .collect();
        if !facts.is_empty() {
            out.push(format!("Nutrition per serving: {}", facts.join(", ")));
        }
    }

    out.join("\n")
}

/// Flatten `recipeInstructions`: plain strings, `HowToStep`s and nested
/// `HowToSection`s.
fn collect_steps(value: &Value, steps: &mut Vec<String>) {
    match value {
        Value::String(s) => {
            // Some sites put every step in one string, one per line
            steps.extend(to_text(s).lines().map(str::to_string));
        }
        Value::Array(items) => items.iter().for_each(|item| collect_steps(item, steps)),
        Value::Object(map) => {
            if let Some(list) = map.get("itemListElement") {
                if let Some(name) = map.get("name").and_then(Value::as_str) {
                    steps.push(format!("{}:", clean(name)));
                }
                collect_steps(list, steps);
            } else if let Some(text) = map
                .get("text")
                .or_else(|| map.get("name"))
                .and_then(Value::as_str)
            {
                let text = clean(text);
                if !text.is_empty() {
                    steps.push(text);
                }
            }
        }
        _ => {}
    }
}

fn nutrition_label(key: &str) -> &str {
    match key {
        "calories" => "calories",
        "proteinContent" => "protein",
        "carbohydrateContent" => "carbohydrates",
        "fatContent" => "fat",
        "saturatedFatContent" => "saturated fat",
        "fiberContent" => "fiber",
        "sugarContent" => "sugar",
        "sodiumContent" => "sodium",
        other => other,
    }
}

/// A string, a number, or the first string of a list.
fn first_text(value: &Value) -> Option<String> {
    let text = match value {
        Value::String(s) => Some(clean(s)),
        Value::Number(n) => Some(n.to_string()),
        Value::Array(items) => items.iter().find_map(first_text),
        _ => None,
    };
    text.filter(|s| !s.is_empty())
}

/// JSON-LD `image`: a URL string, an `ImageObject`, or a list of either.
fn image_url(value: &Value) -> Option<String> {
    match value {
        Value::String(s) if !s.trim().is_empty() => Some(s.trim().to_string()),
        Value::Array(items) => items.iter().find_map(image_url),
        Value::Object(map) => map.get("url").and_then(image_url),
        _ => None,
    }
}

fn clean(text: &str) -> String {
    to_text(text).replace('\n', " ")
}

/// Inner HTML of the first known recipe-plugin card container.
pub fn recipe_card(html: &str) -> Option<&str> {
    let caps = RECIPE_CARD_RE.captures(html)?;
    let open = caps.get(0)?;
    let tag = caps.get(1)?.as_str();
    Some(element_inner(html, open.end(), tag))
}

/// Inner HTML of the first `<article>`.
pub fn article(html: &str) -> Option<&str> {
    let open = ARTICLE_RE.find(html)?;
    Some(element_inner(html, open.end(), "article"))
}

/// Inner HTML of `<body>`, or the whole document when there is none.
pub fn body(html: &str) -> &str {
    BODY_RE
        .captures(html)
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str())
        .unwrap_or(html)
}

/// Content from `content_start` up to the tag that closes the element opened
/// just before it. Unclosed elements run to the end of the document.
fn element_inner<'a>(html: &'a str, content_start: usize, tag: &str) -> &'a str {
    let rest = &html[content_start..];
    let mut depth = 1usize;
    for caps in TAG_NAME_RE.captures_iter(rest) {
        if !caps[2].eq_ignore_ascii_case(tag) || !caps[3].is_empty() {
            continue;
        }
        if caps[1].is_empty() {
            depth += 1;
        } else {
            depth -= 1;
            if depth == 0 {
                let end = caps.get(0).map_or(rest.len(), |m| m.start());
                return &rest[..end];
            }
        }
    }
    rest
}

/// `og:image` (or `twitter:image`) meta content.
pub fn og_image(html: &str) -> Option<String> {
    let mut fallback = None;
    for meta in META_RE.find_iter(html) {
        let mut key = None;
        let mut content = None;
        for caps in ATTR_RE.captures_iter(meta.as_str()) {
            let value = caps.get(2).or_else(|| caps.get(3)).map_or("", |m| m.as_str());
            match caps[1].to_ascii_lowercase().as_str() {
                "property" | "name" => key = Some(value.to_ascii_lowercase()),
                "content" => content = Some(value.trim().to_string()),
                _ => {}
            }
        }
        let (Some(key), Some(content)) = (key, content) else {
            continue;
        };
        if content.is_empty() {
            continue;
        }
        match key.as_str() {
            "og:image" | "og:image:url" | "og:image:secure_url" => {
                return Some(decode_entities(&content))
            }
            "twitter:image" if fallback.is_none() => fallback = Some(decode_entities(&content)),
            _ => {}
        }
    }
    fallback
}
