// Image generator conversation
//
// Seven steps collect the traits of a placeholder image one answer at a
// time and finally send back its URL. Each step extends the draft produced
// by the previous one; a step that does not like its input explains why and
// asks to be repeated.

use std::sync::Arc;

use anyhow::Result;
use chatflow::prelude::*;
use regex::Regex;
use tracing::warn;

use crate::input::Update;
use crate::transport::{Reply, Transport};

/// Formats offered on the format keyboard
pub const IMAGE_FORMATS: [&str; 3] = ["png", "gif", "jpg"];

pub const ASK_WIDTH: &str = "Send me the width of the image to be generated";
pub const ASK_HEIGHT: &str = "Send me the height of the image to be generated";
pub const ASK_BACKGROUND: &str =
    "Send me the background-color of the image to be generated (RGB)";
pub const ASK_FOREGROUND: &str =
    "Send me the foreground-color of the image to be generated (RGB)";
pub const ASK_FORMAT: &str = "Choose a format for the image to be generated";
pub const ASK_TEXT: &str = "Send me a custom text";
pub const USE_KEYBOARD: &str = "Use the keyboard to choose a format please";
pub const CONFIRM: &str = "Send any message to confirm or type /clear to abort.";
pub const GENERATION_FAILED: &str =
    "Something went wrong in the generation process: type anything to retry or send /clear to abort";

/// Traits collected so far
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ImageDraft {
    pub width: Option<u32>,
    pub height: Option<u32>,
    pub background: Option<String>,
    pub foreground: Option<String>,
    pub format: Option<String>,
    pub text: Option<String>,
    pub url: Option<String>,
}

impl ImageDraft {
    /// URL of the finished image, `None` while a trait is missing
    pub fn image_url(&self, base_url: &str) -> Option<String> {
        Some(format!(
            "{}/{}x{}/{}/{}.{}&text={}",
            base_url,
            self.width?,
            self.height?,
            self.background.as_deref()?,
            self.foreground.as_deref()?,
            self.format.as_deref()?,
            self.text.as_deref()?,
        ))
    }

    fn summary(&self, text: &str) -> String {
        format!(
            "An image with the following traits will be generated:\n\
             width: {},\n\
             height: {},\n\
             background-color: {},\n\
             foreground-color: {},\n\
             format: {},\n\
             text: {}",
            display(&self.width),
            display(&self.height),
            display(&self.background),
            display(&self.foreground),
            display(&self.format),
            text,
        )
    }
}

fn display<T: ToString>(value: &Option<T>) -> String {
    value.as_ref().map(ToString::to_string).unwrap_or_default()
}

type ImageStep = DynStep<Update, ImageDraft>;

/// Everything a step needs besides its event
#[derive(Clone)]
struct Conversation {
    user: Arc<str>,
    transport: Arc<dyn Transport>,
}

impl Conversation {
    async fn say(&self, text: &str) -> Result<(), StepError> {
        self.transport.send_text(&self.user, text).await?;
        Ok(())
    }

    async fn show_formats(&self, text: &str) -> Result<(), StepError> {
        self.transport
            .send(&self.user, Reply::keyboard(text, IMAGE_FORMATS))
            .await?;
        Ok(())
    }

    /// Build a step from an async handler receiving this conversation
    fn step<F, Fut>(&self, handler: F) -> ImageStep
    where
        F: Fn(Conversation, StepContext<Update, ImageDraft>) -> Fut + Send + Sync + 'static,
        Fut: std::future::Future<Output = Result<StepOutcome<ImageDraft>, StepError>>
            + Send
            + 'static,
    {
        let conversation = self.clone();
        from_async_fn(move |ctx| handler(conversation.clone(), ctx))
    }
}

fn draft(ctx: &StepContext<Update, ImageDraft>) -> ImageDraft {
    ctx.previous().cloned().unwrap_or_default()
}

fn parse_dimension(update: &Update) -> Option<u32> {
    update
        .text()?
        .trim()
        .parse::<u32>()
        .ok()
        .filter(|value| *value > 0)
}

fn parse_color(pattern: &Regex, update: &Update) -> Option<String> {
    let text = update.text()?.trim();
    pattern.is_match(text).then(|| text.to_lowercase())
}

/// Steps of the image generator conversation for `user`
///
/// The caller is expected to have sent [`ASK_WIDTH`] already; each step asks
/// for the next trait once its own input is accepted.
pub fn image_flow(
    user: &str,
    transport: Arc<dyn Transport>,
    base_url: &str,
) -> Result<Vec<ImageStep>> {
    let hex_color = Regex::new(r"(?i)^[0-9a-f]{6}$")?;
    let conversation = Conversation {
        user: Arc::from(user),
        transport,
    };
    let base_url: Arc<str> = Arc::from(base_url);

    let width = conversation.step(|conv, ctx| async move {
        let Some(width) = parse_dimension(&ctx.event) else {
            conv.say("The width was an invalid value. Try again, please").await?;
            return Ok(StepOutcome::repeat());
        };
        conv.say(ASK_HEIGHT).await?;
        Ok(StepOutcome::advance(ImageDraft {
            width: Some(width),
            ..draft(&ctx)
        }))
    });

    let height = conversation.step(|conv, ctx| async move {
        let Some(height) = parse_dimension(&ctx.event) else {
            conv.say("The height was an invalid value. Try again, please").await?;
            return Ok(StepOutcome::repeat());
        };
        conv.say(ASK_BACKGROUND).await?;
        Ok(StepOutcome::advance(ImageDraft {
            height: Some(height),
            ..draft(&ctx)
        }))
    });

    let background = {
        let hex_color = hex_color.clone();
        conversation.step(move |conv, ctx| {
            let color = parse_color(&hex_color, &ctx.event);
            async move {
                let Some(color) = color else {
                    conv.say("The background-color was an invalid value. Try again, please")
                        .await?;
                    return Ok(StepOutcome::repeat());
                };
                conv.say(ASK_FOREGROUND).await?;
                Ok(StepOutcome::advance(ImageDraft {
                    background: Some(color),
                    ..draft(&ctx)
                }))
            }
        })
    };

    let foreground = conversation.step(move |conv, ctx| {
        let color = parse_color(&hex_color, &ctx.event);
        async move {
            let Some(color) = color else {
                conv.say("The foreground-color was an invalid value. Try again, please")
                    .await?;
                return Ok(StepOutcome::repeat());
            };
            conv.show_formats(ASK_FORMAT).await?;
            Ok(StepOutcome::advance(ImageDraft {
                foreground: Some(color),
                ..draft(&ctx)
            }))
        }
    });

    let format = conversation.step(|conv, ctx| async move {
        let chosen = match &ctx.event {
            Update::Callback(data) if IMAGE_FORMATS.contains(&data.as_str()) => data.clone(),
            _ => {
                conv.show_formats(USE_KEYBOARD).await?;
                return Ok(StepOutcome::repeat());
            }
        };
        conv.say(&format!("You chose the following format: {}", chosen))
            .await?;
        conv.say(ASK_TEXT).await?;
        Ok(StepOutcome::advance(ImageDraft {
            format: Some(chosen),
            ..draft(&ctx)
        }))
    });

    let text = conversation.step(|conv, ctx| async move {
        let text = match ctx.event.text().map(str::trim) {
            Some(text) if !text.is_empty() => text.to_string(),
            _ => {
                conv.say("The text was an invalid value. Try again, please").await?;
                return Ok(StepOutcome::repeat());
            }
        };
        let collected = draft(&ctx);
        conv.say(&collected.summary(&text)).await?;
        conv.say(CONFIRM).await?;
        Ok(StepOutcome::advance(ImageDraft {
            text: Some(text),
            ..collected
        }))
    });

    let generate = conversation.step(move |conv, ctx| {
        let base_url = base_url.clone();
        async move {
            let mut finished = draft(&ctx);
            let url = finished.image_url(&base_url).ok_or_else(|| {
                StepError::new("image traits missing at generation time")
                    .with_kind("INCOMPLETE_DRAFT")
            })?;

            let sent = conv
                .transport
                .send(&conv.user, Reply::Document { url: url.clone() })
                .await;
            if let Err(e) = sent {
                warn!(user = %conv.user, error = %e, "failed to send generated image");
                conv.say(GENERATION_FAILED).await?;
                return Ok(StepOutcome::repeat());
            }

            finished.url = Some(url);
            Ok(StepOutcome::advance(finished))
        }
    });

    Ok(vec![width, height, background, foreground, format, text, generate])
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::RecordingTransport;

    fn complete_draft() -> ImageDraft {
        ImageDraft {
            width: Some(640),
            height: Some(480),
            background: Some("ff0000".into()),
            foreground: Some("00ff00".into()),
            format: Some("png".into()),
            text: Some("hello".into()),
            url: None,
        }
    }

    #[test]
    fn test_image_url() {
        let url = complete_draft().image_url("https://dummyimage.com");
        assert_eq!(
            url.as_deref(),
            Some("https://dummyimage.com/640x480/ff0000/00ff00.png&text=hello")
        );
    }

    #[test]
    fn test_image_url_requires_every_trait() {
        let draft = ImageDraft {
            text: None,
            ..complete_draft()
        };
        assert!(draft.image_url("https://dummyimage.com").is_none());
    }

    #[test]
    fn test_parse_dimension() {
        assert_eq!(parse_dimension(&Update::Message(" 640 ".into())), Some(640));
        assert_eq!(parse_dimension(&Update::Message("0".into())), None);
        assert_eq!(parse_dimension(&Update::Message("wide".into())), None);
        assert_eq!(parse_dimension(&Update::Message("640px".into())), None);
        assert_eq!(parse_dimension(&Update::Message("-5".into())), None);
        assert_eq!(parse_dimension(&Update::Callback("640".into())), None);
    }

    #[test]
    fn test_parse_color() {
        let pattern = Regex::new(r"(?i)^[0-9a-f]{6}$").unwrap();

        assert_eq!(
            parse_color(&pattern, &Update::Message("FF00aa".into())),
            Some("ff00aa".to_string())
        );
        assert_eq!(parse_color(&pattern, &Update::Message("red".into())), None);
        assert_eq!(parse_color(&pattern, &Update::Message("ff00aa00".into())), None);
    }

    #[tokio::test]
    async fn test_width_step_repeats_on_invalid_input() {
        let transport = Arc::new(RecordingTransport::new());
        let steps = image_flow("u1", transport.clone(), "https://dummyimage.com").unwrap();
        assert_eq!(steps.len(), 7);

        let outcome = steps[0]
            .run(StepContext::new(Update::Message("wide".into()), None))
            .await
            .unwrap();
        assert!(outcome.is_repeat());
        assert_eq!(
            transport.texts_for("u1"),
            vec!["The width was an invalid value. Try again, please"]
        );

        let outcome = steps[0]
            .run(StepContext::new(Update::Message("640".into()), None))
            .await
            .unwrap();
        assert_eq!(outcome.into_result().and_then(|d| d.width), Some(640));
        assert_eq!(transport.texts_for("u1").last().unwrap(), ASK_HEIGHT);
    }

    #[tokio::test]
    async fn test_format_step_requires_button() {
        let transport = Arc::new(RecordingTransport::new());
        let steps = image_flow("u1", transport.clone(), "https://dummyimage.com").unwrap();

        let outcome = steps[4]
            .run(StepContext::new(Update::Message("png".into()), None))
            .await
            .unwrap();
        assert!(outcome.is_repeat());
        assert_eq!(
            transport.last_for("u1"),
            Some(Reply::keyboard(USE_KEYBOARD, IMAGE_FORMATS))
        );
    }

    #[tokio::test]
    async fn test_generate_step_fails_on_incomplete_draft() {
        let transport = Arc::new(RecordingTransport::new());
        let steps = image_flow("u1", transport, "https://dummyimage.com").unwrap();

        let result = steps[6]
            .run(StepContext::new(Update::Message("ok".into()), None))
            .await;
        let error = result.unwrap_err();
        assert_eq!(error.kind.as_deref(), Some("INCOMPLETE_DRAFT"));
    }

    #[tokio::test]
    async fn test_reply_failure_becomes_step_error() {
        let transport = Arc::new(RecordingTransport::new());
        transport.set_failing(true);
        let steps = image_flow("u1", transport, "https://dummyimage.com").unwrap();

        let result = steps[0]
            .run(StepContext::new(Update::Message("640".into()), None))
            .await;
        assert!(result.unwrap_err().message.contains("transport unavailable"));
    }
}
