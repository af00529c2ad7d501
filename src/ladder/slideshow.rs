//! Slideshow tier: an HTML document over still images instead of a video

use super::preview::is_non_empty_file;
use super::types::{DegradationTier, GenerationRequest, TierAttempt, TierOutput, TierStrategy};
use crate::error::Result;
use async_trait::async_trait;
use std::path::{Path, PathBuf};

/// Milliseconds between slides while playing
const SLIDE_INTERVAL_MS: u32 = 2000;

#[derive(Debug, Default, Clone, Copy)]
pub struct SlideshowTier;

impl SlideshowTier {
    pub fn new() -> Self {
        Self
    }

    /// HTML companion path: the output's base name with an `.html` extension.
    pub fn html_path(output_path: &Path) -> PathBuf {
        output_path.with_extension("html")
    }

    /// Copy each image next to the output unless it already lives there.
    /// Returns the file names that were staged.
    async fn stage_images(images: &[PathBuf], output_dir: &Path) -> Vec<String> {
        let mut staged = Vec::with_capacity(images.len());
        for image in images {
            let Some(file_name) = image.file_name() else {
                continue;
            };
            let target = output_dir.join(file_name);
            if *image != target {
                if let Err(e) = tokio::fs::copy(image, &target).await {
                    tracing::warn!(
                        image = %image.display(),
                        "Skipping slideshow image: {}",
                        e
                    );
                    continue;
                }
            } else if !is_non_empty_file(image).await {
                continue;
            }
            staged.push(file_name.to_string_lossy().into_owned());
        }
        staged
    }
}

#[async_trait]
impl TierStrategy for SlideshowTier {
    fn tier(&self) -> DegradationTier {
        DegradationTier::Slideshow
    }

    async fn attempt(&self, request: &GenerationRequest) -> Result<TierAttempt> {
        if request.images.is_empty() {
            return Ok(TierAttempt::failed("no input images"));
        }

        let output_dir = request.output_dir();
        let staged = Self::stage_images(&request.images, output_dir).await;
        if staged.is_empty() {
            return Ok(TierAttempt::failed("none of the input images could be staged"));
        }

        let html_path = Self::html_path(&request.output_path);
        let html = render_html(&request.prompt, &staged);
        if let Err(e) = tokio::fs::write(&html_path, html).await {
            return Ok(TierAttempt::failed(format!("writing slideshow failed: {}", e)));
        }

        let marker = format!(
            "This is a placeholder file. Please open the HTML slideshow at {}",
            html_path.display()
        );
        if let Err(e) = tokio::fs::write(&request.output_path, marker).await {
            return Ok(TierAttempt::failed(format!("writing marker failed: {}", e)));
        }

        tracing::info!(
            task_id = %request.task_id,
            html = %html_path.display(),
            slides = staged.len(),
            "Created image slideshow"
        );

        Ok(TierAttempt::Produced(TierOutput {
            preview_path: Some(output_dir.join(&staged[0])),
            degraded: true,
        }))
    }
}

fn escape_html(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
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

/// Self-contained slideshow document. Starts playing on load and offers
/// previous/next/play controls.
fn render_html(title: &str, images: &[String]) -> String {
    let title = if title.trim().is_empty() {
        "Video Generation".to_string()
    } else {
        escape_html(title)
    };

    let slides: String = images
        .iter()
        .enumerate()
        .map(|(i, name)| {
            let active = if i == 0 { " active" } else { "" };
            format!(
                "      <div class=\"slide{}\"><img src=\"{}\" alt=\"Slide {}\"></div>\n",
                active,
                escape_html(name),
                i + 1
            )
        })
        .collect();

    format!(
        r#"<!DOCTYPE html>
<html>
  <head>
    <meta charset="utf-8">
    <title>{title}</title>
    <style>
      body {{
        margin: 0; background: black; height: 100vh;
        display: flex; justify-content: center; align-items: center;
      }}
      .slideshow {{ max-width: 100%; max-height: 90vh; position: relative; }}
      .slide {{ display: none; width: 100%; }}
      img {{ max-width: 100%; max-height: 90vh; display: block; margin: 0 auto; }}
      .active {{ display: block; }}
      .controls {{
        position: absolute; bottom: 20px; width: 100%;
        display: flex; justify-content: center;
      }}
      .controls button {{
        background: rgba(255,255,255,0.5); border: none;
        padding: 10px 20px; margin: 0 5px; cursor: pointer;
      }}
    </style>
  </head>
  <body>
    <div class="slideshow">
{slides}      <div class="controls">
        <button id="prevBtn">Previous</button>
        <button id="nextBtn">Next</button>
        <button id="playBtn">Play</button>
      </div>
    </div>
    <script>
      let slideIndex = 0;
      const slides = document.querySelectorAll('.slide');
      let playing = false;
      let timer;

      function showSlide(n) {{
        slides.forEach(s => s.classList.remove('active'));
        slideIndex = (n + slides.length) % slides.length;
        slides[slideIndex].classList.add('active');
      }}

      function togglePlay() {{
        if (playing) {{
          clearInterval(timer);
          document.getElementById('playBtn').textContent = 'Play';
        }} else {{
          timer = setInterval(() => showSlide(slideIndex + 1), {interval});
          document.getElementById('playBtn').textContent = 'Pause';
        }}
        playing = !playing;
      }}

      document.getElementById('nextBtn').addEventListener('click', () => showSlide(slideIndex + 1));
      document.getElementById('prevBtn').addEventListener('click', () => showSlide(slideIndex - 1));
      document.getElementById('playBtn').addEventListener('click', togglePlay);
      togglePlay();
    </script>
  </body>
</html>
"#,
        title = title,
        slides = slides,
        interval = SLIDE_INTERVAL_MS,
    )
}
