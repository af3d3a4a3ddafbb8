//! Rendering of questions into channel posts and inline answers.

use serde::Serialize;

use crate::domain::QuestionHit;

/// Inline answers carry at most this many results.
pub const INLINE_RESULT_LIMIT: usize = 5;

/// Decode HTML entities the Stack Exchange API leaves in titles (`&quot;`, `&#39;`, ...).
pub fn decode_title(title: &str) -> String {
    html_escape::decode_html_entities(title).into_owned()
}

/// Plain-text post: decoded title, newline, link.
pub fn render_post(title: &str, link: &str) -> String {
    format!("{}\n{}", decode_title(title), link)
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct InputMessageContent {
    pub message_text: String,
}

/// Bot API `InlineQueryResultArticle`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct InlineArticle {
    #[serde(rename = "type")]
    pub kind: &'static str,
    pub id: String,
    pub title: String,
    pub input_message_content: InputMessageContent,
    pub url: String,
    pub hide_url: bool,
}

impl InlineArticle {
    pub fn from_hit(hit: &QuestionHit) -> Self {
        let title = decode_title(&hit.title);
        Self {
            kind: "article",
            id: hit.question_id.to_string(),
            input_message_content: InputMessageContent {
                message_text: format!("{title}\n{}", hit.link),
            },
            title,
            url: hit.link.clone(),
            hide_url: true,
        }
    }
}

/// Build the inline answer for a list of hits, capped at [`INLINE_RESULT_LIMIT`].
pub fn inline_articles(hits: &[QuestionHit]) -> Vec<InlineArticle> {
    hits.iter()
        .take(INLINE_RESULT_LIMIT)
        .map(InlineArticle::from_hit)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn post_is_title_newline_link() {
        assert_eq!(
            render_post("Saluton", "http://x/5"),
            "Saluton\nhttp://x/5"
        );
    }

    #[test]
    fn titles_are_entity_decoded() {
        assert_eq!(
            render_post("Kio estas &quot;ĉu&quot; &amp; &#39;ke&#39;?", "http://x/1"),
            "Kio estas \"ĉu\" & 'ke'?\nhttp://x/1"
        );
    }

    #[test]
    fn article_serializes_like_the_bot_api_expects() {
        let hit = QuestionHit {
            question_id: 77,
            title: "Pri &lt;la&gt;".into(),
            link: "https://esperanto.stackexchange.com/q/77".into(),
        };
        let v = serde_json::to_value(InlineArticle::from_hit(&hit)).unwrap();
        assert_eq!(
            v,
            json!({
                "type": "article",
                "id": "77",
                "title": "Pri <la>",
                "input_message_content": {
                    "message_text": "Pri <la>\nhttps://esperanto.stackexchange.com/q/77"
                },
                "url": "https://esperanto.stackexchange.com/q/77",
                "hide_url": true
            })
        );
    }

    #[test]
    fn inline_answers_are_capped() {
        let hits: Vec<QuestionHit> = (0..8)
            .map(|i| QuestionHit {
                question_id: i,
                title: format!("q{i}"),
                link: format!("http://x/{i}"),
            })
            .collect();
        let arts = inline_articles(&hits);
        assert_eq!(arts.len(), INLINE_RESULT_LIMIT);
        assert_eq!(arts[0].id, "0");
        assert_eq!(arts[4].id, "4");
    }
}
