//! JavaScript evaluated inside pages by the Chrome driver.
//!
//! The locator engine resolves a [`FramePath`] to a same-process document
//! (cross-origin frames are reachable because the browser is launched with
//! site isolation off), evaluates a locator descriptor against it and
//! performs the requested operation. Every script returns a JSON string so
//! the driver can parse it with serde.

use crate::browser::session::StorageEntry;
use crate::core::FramePath;
use crate::errors::Result;
use crate::locator::Locator;
use serde_json::{json, Map, Value};

const ENGINE: &str = r#"
(function() {
    const request = __REQUEST__;
    const normalize = s => (s || '').replace(/\s+/g, ' ').trim();

    const textMatches = (m, candidate, loose) => {
        if (!m) return true;
        const text = normalize(candidate);
        if (m.kind === 'exact' && !loose) return text === normalize(m.value);
        if (m.kind === 'exact' || m.kind === 'contains') {
            return text.toLowerCase().includes(normalize(m.value).toLowerCase());
        }
        return new RegExp(m.source, m.flags).test(text);
    };

    const resolveDocument = path => {
        let doc = document;
        for (const seg of path) {
            const frame = seg.css !== undefined
                ? doc.querySelector(seg.css)
                : doc.querySelectorAll('iframe, frame')[seg.index];
            if (!frame) return { error: 'no frame for ' + JSON.stringify(seg) };
            let child = null;
            try { child = frame.contentDocument; } catch (e) { child = null; }
            if (!child) return { error: 'frame not accessible: ' + JSON.stringify(seg) };
            doc = child;
        }
        return { doc };
    };

    const isVisible = el => {
        const style = el.ownerDocument.defaultView.getComputedStyle(el);
        if (style.visibility === 'hidden' || style.display === 'none') return false;
        const rect = el.getBoundingClientRect();
        return rect.width > 0 && rect.height > 0;
    };

    const implicitRole = el => {
        const tag = el.tagName.toLowerCase();
        const type = (el.getAttribute('type') || '').toLowerCase();
        if (tag === 'button') return 'button';
        if (tag === 'a') return el.hasAttribute('href') ? 'link' : null;
        if (/^h[1-6]$/.test(tag)) return 'heading';
        if (tag === 'textarea') return 'textbox';
        if (tag === 'select') return el.multiple ? 'listbox' : 'combobox';
        if (tag === 'img') return 'img';
        if (tag === 'dialog') return 'dialog';
        if (tag === 'input') {
            if (['button', 'submit', 'reset', 'image'].includes(type)) return 'button';
            if (type === 'checkbox' || type === 'radio') return type;
            if (['', 'text', 'email', 'tel', 'url', 'search', 'password', 'number'].includes(type)) return 'textbox';
        }
        return null;
    };
    const roleOf = el => (el.getAttribute('role') || '').split(' ')[0] || implicitRole(el);

    const accessibleName = el => {
        const doc = el.ownerDocument;
        const labelledBy = el.getAttribute('aria-labelledby');
        if (labelledBy) {
            const text = labelledBy.split(/\s+/).map(id => doc.getElementById(id))
                .filter(Boolean).map(n => n.textContent).join(' ');
            if (normalize(text)) return normalize(text);
        }
        const aria = el.getAttribute('aria-label');
        if (normalize(aria)) return normalize(aria);
        if (el.labels && el.labels.length) {
            return normalize(Array.from(el.labels).map(l => l.textContent).join(' '));
        }
        const tag = el.tagName.toLowerCase();
        if (tag === 'input' && ['button', 'submit', 'reset'].includes(el.type)) return normalize(el.value);
        if (tag === 'img') return normalize(el.getAttribute('alt'));
        if (['input', 'textarea', 'select'].includes(tag)) {
            return normalize(el.getAttribute('placeholder') || el.getAttribute('title'));
        }
        return normalize(el.innerText || el.textContent) || normalize(el.getAttribute('title'));
    };

    const textOf = el => normalize(el.innerText !== undefined ? el.innerText : el.textContent);

    const checkedOf = el => {
        if (el.type === 'checkbox' || el.type === 'radio') return !!el.checked;
        for (const attr of ['aria-checked', 'aria-selected', 'aria-pressed']) {
            const value = el.getAttribute(attr);
            if (value !== null) return value === 'true';
        }
        const input = el.querySelector && el.querySelector('input[type=radio], input[type=checkbox]');
        if (input) return !!input.checked;
        if (/(^|[-_\s])(active|selected|checked)(\s|$)/i.test(el.getAttribute('class') || '')) return true;
        return null;
    };

    const all = doc => Array.from(doc.querySelectorAll('*'));

    const find = (doc, loc) => {
        switch (loc.kind) {
            case 'css': return Array.from(doc.querySelectorAll(loc.selector));
            case 'testid': return Array.from(doc.querySelectorAll('[data-testid="' + CSS.escape(loc.id) + '"]'));
            case 'role': return all(doc).filter(el => roleOf(el) === loc.role
                && (!loc.name || textMatches(loc.name, accessibleName(el), false)));
            case 'text': {
                const hits = all(doc).filter(el => !['SCRIPT', 'STYLE', 'HEAD'].includes(el.tagName)
                    && textMatches(loc.text, textOf(el), false));
                return hits.filter(el => !hits.some(other => other !== el && el.contains(other)));
            }
            case 'filtered': return find(doc, loc.base).filter(el =>
                (!loc.hasText || textMatches(loc.hasText, textOf(el), true))
                && (!loc.hasNotText || !textMatches(loc.hasNotText, textOf(el), true)));
            case 'any': {
                const seen = new Set();
                const out = [];
                for (const sub of loc.locators) {
                    for (const el of find(doc, sub)) {
                        if (!seen.has(el)) { seen.add(el); out.push(el); }
                    }
                }
                return out;
            }
        }
        throw new Error('unknown locator kind ' + loc.kind);
    };

    const fail = (kind, message) => ({ ok: false, kind, message });

    const pick = (elements, force) => {
        const visible = elements.find(isVisible);
        if (visible) {
            if (visible.disabled && !force) return { failure: fail('notinteractable', 'element is disabled') };
            return { el: visible };
        }
        if (elements.length === 0) return { failure: fail('notfound', 'no element matches') };
        if (force) return { el: elements[0] };
        return { failure: fail('notinteractable', 'element is not visible') };
    };

    const fire = el => {
        const view = el.ownerDocument.defaultView;
        for (const type of ['pointerdown', 'mousedown', 'pointerup', 'mouseup']) {
            const Ctor = type.startsWith('pointer') && view.PointerEvent ? view.PointerEvent : view.MouseEvent;
            el.dispatchEvent(new Ctor(type, { bubbles: true, cancelable: true, view }));
        }
        el.click();
    };

    const run = () => {
        const resolved = resolveDocument(request.frame);
        if (resolved.error) return fail('frame', resolved.error);
        const doc = resolved.doc;
        if (request.op === 'text') return { ok: true, value: doc.body ? doc.body.innerText : '' };

        const elements = find(doc, request.locator);
        if (request.op === 'query') {
            const first = elements.find(isVisible) || elements[0];
            return { ok: true, value: {
                count: elements.length,
                visible: elements.some(isVisible),
                checked: first ? checkedOf(first) : null,
                text: first ? textOf(first) : null,
            } };
        }

        const picked = pick(elements, !!request.force);
        if (picked.failure) return picked.failure;
        const el = picked.el;
        el.scrollIntoView({ block: 'center', inline: 'center' });

        switch (request.op) {
            case 'click':
                fire(el);
                return { ok: true, value: null };
            case 'check':
                if (checkedOf(el) !== true) fire(el);
                return { ok: true, value: checkedOf(el) };
            case 'focus':
                el.focus();
                if (request.clear && 'value' in el) {
                    const proto = Object.getPrototypeOf(el);
                    const setter = Object.getOwnPropertyDescriptor(proto, 'value');
                    if (setter && setter.set) setter.set.call(el, ''); else el.value = '';
                    el.dispatchEvent(new Event('input', { bubbles: true }));
                }
                return { ok: true, value: null };
        }
        return fail('unsupported', 'unknown op ' + request.op);
    };

    try {
        return JSON.stringify(run());
    } catch (e) {
        return JSON.stringify(fail('script', String(e)));
    }
})()
"#;

const FRAMES: &str = r#"
(function() {
    const out = [];
    const walk = (doc, path) => {
        Array.from(doc.querySelectorAll('iframe, frame')).forEach((frame, index) => {
            const childPath = path.concat([{ index }]);
            let child = null;
            try { child = frame.contentDocument; } catch (e) { child = null; }
            let url = frame.getAttribute('src') || '';
            try { if (frame.contentWindow) url = frame.contentWindow.location.href; } catch (e) {}
            out.push({ path: childPath, url });
            if (child) walk(child, childPath);
        });
    };
    walk(document, []);
    return JSON.stringify(out);
})()
"#;

const LOCAL_STORAGE: &str = r#"
(function() {
    const entries = [];
    try {
        for (let i = 0; i < localStorage.length; i++) {
            const name = localStorage.key(i);
            if (name) entries.push({ name, value: localStorage.getItem(name) });
        }
    } catch (e) {}
    return JSON.stringify({ origin: window.location.origin, localStorage: entries });
})()
"#;

const CLEAR_STORAGE: &str = r#"
(function() {
    let cleared = 0;
    try { localStorage.clear(); sessionStorage.clear(); } catch (e) {}
    try {
        document.cookie.split(';').forEach(cookie => {
            const name = cookie.split('=')[0].trim();
            if (!name) return;
            const host = window.location.hostname;
            for (const domain of ['', host, '.' + host]) {
                document.cookie = name + '=; expires=Thu, 01 Jan 1970 00:00:00 GMT; path=/'
                    + (domain ? '; domain=' + domain : '');
            }
            cleared++;
        });
    } catch (e) {}
    return JSON.stringify(cleared);
})()
"#;

/// Build a locator-engine call. `extra` fields are merged into the request.
pub fn engine_call(op: &str, frame: &FramePath, locator: Option<&Locator>, extra: Value) -> Result<String> {
    let mut request = Map::new();
    request.insert("op".to_string(), json!(op));
    request.insert("frame".to_string(), serde_json::to_value(frame)?);
    if let Some(locator) = locator {
        request.insert("locator".to_string(), locator.descriptor());
    }
    if let Value::Object(fields) = extra {
        request.extend(fields);
    }
    Ok(ENGINE.replace("__REQUEST__", &Value::Object(request).to_string()))
}

pub fn list_frames() -> &'static str {
    FRAMES
}

pub fn read_local_storage() -> &'static str {
    LOCAL_STORAGE
}

pub fn clear_storage() -> &'static str {
    CLEAR_STORAGE
}

/// Seed localStorage for the origin the tab is currently on.
pub fn seed_local_storage(entries: &[StorageEntry]) -> Result<String> {
    Ok(format!(
        r#"
(function() {{
    const entries = {};
    try {{ entries.forEach(e => localStorage.setItem(e.name, e.value)); }} catch (e) {{}}
    return JSON.stringify({{ entries: entries.length }});
}})()
"#,
        serde_json::to_string(entries)?
    ))
}
