use super::config::{ContentType, Feature, FieldLimit, PlatformConfig, Role, TagStyle};
use super::traits::Plugin;

/// X (Twitter) compose box.
pub struct X {
    config: PlatformConfig,
}

impl X {
    pub fn new() -> Self {
        Self { config: config() }
    }
}

impl Default for X {
    fn default() -> Self {
        Self::new()
    }
}

impl Plugin for X {
    fn config(&self) -> &PlatformConfig {
        &self.config
    }
}

pub fn config() -> PlatformConfig {
    PlatformConfig::new("x", "X", ContentType::Text)
        .urls(&[
            "https://x.com/compose/*",
            "https://x.com/home*",
            "https://twitter.com/compose/*",
            "https://twitter.com/home*",
        ])
        .editor("https://x.com/compose/post")
        .select(
            Role::Content,
            &[
                "[data-testid=\"tweetTextarea_0\"]",
                ".public-DraftEditor-content[role=\"textbox\"]",
                "[role=\"textbox\"][contenteditable=\"true\"]",
            ],
        )
        .select(Role::UploadInput, &["input[data-testid=\"fileInput\"]", "input[type=\"file\"]"])
        .keywords(Role::Content, &["what is happening", "post text"])
        .features(&[Feature::Content, Feature::Tags, Feature::Images])
        .handling(|h| {
            h.content_limit = Some(FieldLimit::max(280));
            h.image_limit = Some(4);
            h.tag_style = TagStyle::Hashtag;
            h.tag_limit = Some(FieldLimit::max(3));
            h.merge_title_into_content = true;
            h.required = vec![Role::Content];
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::payload::FillPayload;
    use crate::platforms::common::compose;
    use crate::text::TagsInput;

    #[test]
    fn post_fits_in_one_tweet_with_hashtags() {
        let payload = FillPayload {
            title: Some("Shipping day".into()),
            content: Some(format!("<p>{}</p>", "word ".repeat(100))),
            tags: Some(TagsInput::Text("rust, tokio, cdp, extra".into())),
            ..FillPayload::default()
        };
        let body = compose(&config(), &payload).body.unwrap().plain();

        assert_eq!(body.chars().count(), 280);
        assert!(body.starts_with("Shipping day\n\nword"));
        assert!(body.ends_with("#rust #tokio #cdp"));
    }
}
