//! The app-shell page.
//!
//! Served at `/`, and primed into the gateway's static tier at install so
//! the board still renders when the backend is unreachable. Deployments
//! usually point `shell_file` at their own page; the built-in one renders
//! whatever the messages collection holds.

use axum::extract::State;
use axum::response::Html;

use crate::api::ContentState;

pub const BUILTIN_SHELL: &str = r#"<!doctype html>
<html lang="en">
<head>
<meta charset="utf-8">
<meta name="viewport" content="width=device-width, initial-scale=1">
<title>Shul Board</title>
<style>
  body { margin: 0; background: #10141c; color: #f2ead9; font-family: Georgia, serif; }
  header { padding: 1.5rem 2rem; border-bottom: 1px solid #2a3242; }
  h1 { margin: 0; font-size: 2rem; letter-spacing: 0.04em; }
  #messages { padding: 2rem; display: grid; gap: 1rem; }
  .card { background: #1a202c; border-radius: 8px; padding: 1.25rem 1.5rem; font-size: 1.25rem; }
  .empty { color: #8a94a6; font-style: italic; }
</style>
</head>
<body>
<header><h1>Shul Board</h1></header>
<div id="messages"><p class="empty">Loading&hellip;</p></div>
<script>
async function refresh() {
  try {
    const res = await fetch('/api/messages', { headers: { accept: 'application/json' } });
    if (!res.ok) return;
    const messages = await res.json();
    const root = document.getElementById('messages');
    root.innerHTML = '';
    if (messages.length === 0) {
      root.innerHTML = '<p class="empty">No announcements.</p>';
      return;
    }
    for (const message of messages) {
      const card = document.createElement('div');
      card.className = 'card';
      card.textContent = message.title || message.text || '';
      root.appendChild(card);
    }
  } catch (_) {
    // Offline: keep whatever is on screen.
  }
}
refresh();
setInterval(refresh, 60000);
</script>
</body>
</html>
"#;

/// Serve the shell page.
pub async fn shell(State(state): State<ContentState>) -> Html<String> {
    Html(state.shell.as_ref().clone())
}
