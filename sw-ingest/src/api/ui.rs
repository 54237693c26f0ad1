//! UI routes: HTML pages driving the session API (vanilla JS, no frameworks)

use axum::{
    response::{Html, IntoResponse},
    routing::get,
    Router,
};

use crate::AppState;

/// Build UI routes
pub fn ui_routes() -> Router<AppState> {
    Router::new()
        .route("/", get(root_page))
        .route("/log", get(log_page))
}

/// GET /
///
/// One page per session; every button posts an action and re-renders the
/// returned view.
async fn root_page() -> impl IntoResponse {
    Html(
        r#"<!DOCTYPE html>
<html lang="en">
<head>
    <meta charset="UTF-8">
    <meta name="viewport" content="width=device-width, initial-scale=1.0">
    <title>Saving Willy - Observation Ingest</title>
    <style>
        body { font-family: system-ui, -apple-system, sans-serif; max-width: 960px; margin: 30px auto; padding: 0 20px; line-height: 1.5; }
        h1 { border-bottom: 2px solid #0066cc; padding-bottom: 8px; }
        .progress { color: #555; font-family: monospace; }
        .obs { border: 1px solid #ddd; border-radius: 4px; padding: 10px; margin: 10px 0; }
        .obs.incomplete { border-color: #d88; }
        .error { color: #b00; }
        button { padding: 8px 16px; margin: 4px; }
        input { margin: 2px 6px 2px 0; }
    </style>
</head>
<body>
    <h1>Saving Willy</h1>
    <p class="progress" id="progress"></p>
    <p id="message"></p>
    <div>
        <label>Author email <input id="email" type="email"></label>
        <input id="files" type="file" multiple accept=".jpg,.jpeg,.png,.webp">
    </div>
    <div id="errors"></div>
    <div id="observations"></div>
    <div id="actions">
        <button data-action="validate">Validate</button>
        <button data-action="classify">Identify with cetacean classifier</button>
        <button data-action="confirm">Confirm species</button>
        <button data-action="upload">Upload observations</button>
        <button data-action="reset">Reset</button>
    </div>
    <pre id="report"></pre>
    <p><a href="/log">Log</a> | <a href="/species">Species</a></p>
<script>
let sessionId = null;

async function call(method, path, body) {
    const opts = { method, headers: { 'Content-Type': 'application/json' } };
    if (body !== undefined) opts.body = JSON.stringify(body);
    const res = await fetch(path, opts);
    const json = await res.json().catch(() => null);
    if (!res.ok) { alert(json && json.error ? json.error.message : res.statusText); return null; }
    return json;
}

function actionState(view, name) { return view.actions[name].state; }

function render(view) {
    if (!view) return;
    document.getElementById('progress').textContent =
        `Stage ${view.progress.index}/${view.progress.total}: ${view.progress.state}`;
    document.getElementById('message').textContent = view.message;
    const editable = actionState(view, 'edit_inputs') === 'enabled';
    document.getElementById('email').disabled = !editable;
    document.getElementById('files').disabled = !editable;
    document.getElementById('errors').innerHTML = view.field_errors
        .map(e => `<p class="error">${e.message} (${e.value})</p>`).join('');

    const container = document.getElementById('observations');
    container.innerHTML = '';
    for (const o of view.observations) {
        const div = document.createElement('div');
        div.className = 'obs' + (o.incomplete ? ' incomplete' : '');
        let html = `<strong>${o.image_filename}</strong> <code>${o.image_hash.slice(0, 8)}</code><br>`;
        for (const f of ['latitude', 'longitude', 'date', 'time']) {
            html += `<label>${f} <input data-hash="${o.image_hash}" data-field="${f}" value="${o[f] || ''}" ${editable ? '' : 'disabled'}></label>`;
        }
        if (o.predictions.length) {
            html += '<br>' + o.predictions.map(p =>
                `<label><input type="radio" name="sel-${o.image_hash}" value="${p.label}" ${p.label === o.selected_class ? 'checked' : ''}
                 ${actionState(view, 'select_class') === 'enabled' ? '' : 'disabled'}> #${p.rank} ${p.display_name}</label>`).join(' ');
            if (o.class_overriden) html += ' <em>(overridden)</em>';
        }
        div.innerHTML = html;
        container.appendChild(div);
    }
    for (const btn of document.querySelectorAll('#actions button')) {
        const st = actionState(view, btn.dataset.action);
        btn.hidden = st === 'hidden';
        btn.disabled = st !== 'enabled';
    }
    document.getElementById('report').textContent =
        view.upload_report ? JSON.stringify(view.upload_report, null, 2) : '';
}

async function readFile(file) {
    return new Promise((resolve, reject) => {
        const reader = new FileReader();
        reader.onload = () => resolve({ filename: file.name, data: reader.result.split(',')[1] });
        reader.onerror = reject;
        reader.readAsDataURL(file);
    });
}

document.getElementById('email').addEventListener('change', async e => {
    render(await call('PUT', `/sessions/${sessionId}/author`, { author_email: e.target.value }));
});
document.getElementById('files').addEventListener('change', async e => {
    const files = await Promise.all([...e.target.files].map(readFile));
    render(await call('PUT', `/sessions/${sessionId}/files`, { files }));
});
document.getElementById('observations').addEventListener('change', async e => {
    const t = e.target;
    if (t.dataset.field) {
        render(await call('PATCH', `/sessions/${sessionId}/observations/${t.dataset.hash}`, { [t.dataset.field]: t.value }));
    } else if (t.type === 'radio') {
        const hash = t.name.slice(4);
        render(await call('PUT', `/sessions/${sessionId}/observations/${hash}/class`, { selected_class: t.value }));
    }
});
for (const btn of document.querySelectorAll('#actions button')) {
    btn.addEventListener('click', async () => {
        render(await call('POST', `/sessions/${sessionId}/${btn.dataset.action}`));
    });
}

(async () => {
    const view = await call('POST', '/sessions');
    if (view) { sessionId = view.session_id; render(view); }
})();
</script>
</body>
</html>
"#,
    )
}

/// GET /log
async fn log_page() -> impl IntoResponse {
    Html(
        r#"<!DOCTYPE html>
<html lang="en">
<head>
    <meta charset="UTF-8">
    <title>Saving Willy - Log</title>
    <style>
        body { font-family: monospace; margin: 20px; }
        td { padding: 2px 8px; vertical-align: top; }
        .WARN { color: #a60; } .ERROR { color: #b00; }
    </style>
</head>
<body>
    <p id="summary"></p>
    <table id="records"></table>
<script>
async function refresh() {
    const snap = await (await fetch('/logs')).json();
    document.getElementById('summary').textContent =
        `Length of records: ${snap.in_buffer} (total seen: ${snap.total})`;
    document.getElementById('records').innerHTML = snap.records.map(r =>
        `<tr class="${r.level}"><td>${r.n}</td><td>${r.timestamp}</td><td>${r.level}</td><td>${r.target}</td><td>${r.message}</td></tr>`).join('');
}
refresh();
setInterval(refresh, 5000);
</script>
</body>
</html>
"#,
    )
}
