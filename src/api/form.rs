use crate::models::prediction::PredictionResult;

const PAGE_HEAD: &str = r#"<!doctype html>
<html lang="en">
<head>
  <meta charset="utf-8">
  <meta name="viewport" content="width=device-width, initial-scale=1">
  <title>Emotion Classifier</title>
  <style>
    body { font-family: sans-serif; margin: 2em; background-color: #f4f4f4; }
    .container { max-width: 500px; margin: auto; background: #fff; padding: 20px; border-radius: 8px; box-shadow: 0 0 10px rgba(0,0,0,0.1); }
    h1 { text-align: center; color: #333; }
    input[type=file] { display: block; margin-bottom: 10px; }
    input[type=submit] { background-color: #5cb85c; color: white; padding: 10px 15px; border: none; border-radius: 4px; cursor: pointer; }
    input[type=submit]:hover { background-color: #4cae4c; }
    .result { margin-top: 20px; padding: 15px; background: #e9e9e9; border-radius: 4px; }
  </style>
</head>
<body>
<div class="container">
  <h1>Upload Image for Emotion Classification</h1>
  <form method="post" enctype="multipart/form-data" action="/predict">
    <input type="file" name="file" accept="image/*" required>
    <input type="submit" value="Upload">
  </form>
"#;

const PAGE_TAIL: &str = "</div>\n</body>\n</html>\n";

/// Upload page, with the result block when a prediction is given.
pub fn render(prediction: Option<&PredictionResult>) -> String {
    let mut page = String::from(PAGE_HEAD);
    if let Some(p) = prediction {
        page.push_str("  <div class=\"result\">\n    <h2>Prediction Result:</h2>\n");
        page.push_str(&format!("    <p><strong>Emotion:</strong> {}</p>\n", escape(&p.emotion)));
        if let Some(c) = p.confidence {
            page.push_str(&format!("    <p><strong>Confidence:</strong> {:.2}%</p>\n", c * 100.0));
        }
        if let Some(e) = p.error.as_deref().filter(|e| !e.is_empty()) {
            page.push_str(&format!("    <p><strong>Error:</strong> {}</p>\n", escape(e)));
        }
        page.push_str("  </div>\n");
    }
    page.push_str(PAGE_TAIL);
    page
}

fn escape(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for ch in s.chars() {
        match ch {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#x27;"),
            _ => out.push(ch),
        }
    }
    out
}
