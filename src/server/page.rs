use chrono::{DateTime, Utc};

/// Everything the single page can show. All fields optional: the bare
/// form is rendered when nothing is set.
#[derive(Debug, Default)]
pub struct PageView<'a> {
    pub video_url: Option<&'a str>,
    pub processing_time: Option<f64>,
    pub title: Option<&'a str>,
    pub uploader: Option<&'a str>,
    /// Length of the source video in seconds
    pub source_duration: Option<f64>,
    pub error: Option<&'a str>,
    pub rendered_at: Option<DateTime<Utc>>,
}

pub fn render(view: &PageView<'_>) -> String {
    let mut body = String::new();

    if let Some(error) = view.error {
        body.push_str(&format!(
            "<p class=\"error\">{}</p>\n",
            escape(error)
        ));
    }

    if let Some(url) = view.video_url {
        if let Some(title) = view.title {
            body.push_str(&format!("<h2>{}</h2>\n", escape(title)));
        }
        let mut meta = Vec::new();
        if let Some(uploader) = view.uploader {
            meta.push(format!("by {}", escape(uploader)));
        }
        if let Some(secs) = view.source_duration {
            meta.push(format!("source length {}", clock(secs)));
        }
        if !meta.is_empty() {
            body.push_str(&format!("<p class=\"meta\">{}</p>\n", meta.join(", ")));
        }
        body.push_str(&format!(
            "<video controls autoplay loop width=\"480\" src=\"{}\"></video>\n",
            escape(url)
        ));
    }

    if let Some(secs) = view.processing_time {
        body.push_str(&format!(
            "<p>Processing time: {:.2} seconds</p>\n",
            secs
        ));
    }

    if let Some(at) = view.rendered_at {
        body.push_str(&format!(
            "<p class=\"stamp\">Generated {}</p>\n",
            at.format("%Y-%m-%d %H:%M:%S UTC")
        ));
    }

    format!(
        r#"<!DOCTYPE html>
<html lang="en">
<head>
<meta charset="utf-8">
<title>audioflicker</title>
<style>
body {{ font-family: sans-serif; max-width: 40em; margin: 2em auto; }}
input[type=url] {{ width: 28em; }}
.error {{ color: #b00; }}
.stamp, .meta {{ color: #777; font-size: small; }}
</style>
</head>
<body>
<h1>Loudness to color</h1>
<form action="/process_video" method="post">
<input type="url" name="url" placeholder="https://www.youtube.com/watch?v=..." required>
<button type="submit">Generate</button>
</form>
{body}</body>
</html>
"#
    )
}

/// `m:ss`, or `h:mm:ss` past an hour.
fn clock(secs: f64) -> String {
    let total = secs.max(0.0).round() as u64;
    let (h, m, s) = (total / 3600, total / 60 % 60, total % 60);
    if h > 0 {
        format!("{}:{:02}:{:02}", h, m, s)
    } else {
        format!("{}:{:02}", m, s)
    }
}

/// Minimal HTML escaping for text and attribute values.
pub fn escape(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(c),
        }
    }
    out
}
