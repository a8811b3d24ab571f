//! Viewer page

use axum::response::Html;

const INDEX_HTML: &str = r#"<!DOCTYPE html>
<html lang="en">
<head>
  <meta charset="utf-8">
  <title>Drowsiness Monitor</title>
  <style>
    body { font-family: sans-serif; background: #111; color: #eee; margin: 2rem; }
    .feed { border: 2px solid #333; max-width: 100%; }
    .line { font-weight: bold; margin: 0.2rem 0; }
    .green { color: #0f0; } .red { color: #f33; } .orange { color: #ffa500; }
  </style>
</head>
<body>
  <h1>Drowsiness Monitor</h1>
  <img class="feed" id="feed" alt="camera feed">
  <div id="status"></div>
  <script>
    // Each page load owns one detection session
    const session = crypto.randomUUID();
    document.getElementById('feed').src = '/video_feed?session=' + session;

    async function refresh() {
      try {
        const res = await fetch('/api/v1/sessions/' + session);
        const el = document.getElementById('status');
        el.innerHTML = '';
        if (!res.ok) { return; }
        const snapshot = await res.json();
        for (const line of snapshot.overlay) {
          const div = document.createElement('div');
          div.className = 'line ' + line.color;
          div.textContent = line.text;
          el.appendChild(div);
        }
      } catch (e) { /* server restarting */ }
    }
    setInterval(refresh, 500);
  </script>
</body>
</html>
"#;

/// `GET /`
pub async fn index() -> Html<&'static str> {
    Html(INDEX_HTML)
}
