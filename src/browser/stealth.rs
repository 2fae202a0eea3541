//! Anti-detection init script attached to every page before navigation.
//! Based on puppeteer-extra-plugin-stealth techniques.

/// Bumped whenever a patch is added, removed or changed.
pub const STEALTH_VERSION: u32 = 3;

/// Named evasion patches, applied in order.
pub const STEALTH_PATCHES: &[(&str, &str)] = &[
    (
        "webdriver",
        r#"
    Object.defineProperty(Navigator.prototype, 'webdriver', {
        get: () => undefined,
        configurable: true
    });
    "#,
    ),
    (
        "chrome_runtime",
        r#"
    if (!window.chrome) {
        window.chrome = {
            runtime: {},
            loadTimes: function() {},
            csi: function() {},
            app: {}
        };
    }
    "#,
    ),
    (
        "permissions",
        r#"
    const originalQuery = window.navigator.permissions.query;
    window.navigator.permissions.query = (parameters) => (
        parameters.name === 'notifications' ?
        Promise.resolve({ state: Notification.permission }) :
        originalQuery(parameters)
    );
    "#,
    ),
    (
        "plugins",
        r#"
    Object.defineProperty(navigator, 'plugins', {
        get: () => [
            { name: 'Chrome PDF Plugin', filename: 'internal-pdf-viewer', description: 'Portable Document Format' },
            { name: 'Chrome PDF Viewer', filename: 'mhjfbmdgcfjbbpaeojofohoefgiehjai', description: '' },
            { name: 'Native Client', filename: 'internal-nacl-plugin', description: '' }
        ],
        configurable: true
    });
    Object.defineProperty(navigator, 'mimeTypes', {
        get: () => [
            { type: 'application/pdf', suffixes: 'pdf', description: 'Portable Document Format' }
        ],
        configurable: true
    });
    "#,
    ),
    (
        "languages",
        r#"
    Object.defineProperty(navigator, 'languages', {
        get: () => __LANGUAGES__,
        configurable: true
    });
    "#,
    ),
    (
        "cdc_props",
        r#"
    delete window.cdc_adoQpoasnfa76pfcZLmcfl_Array;
    delete window.cdc_adoQpoasnfa76pfcZLmcfl_Promise;
    delete window.cdc_adoQpoasnfa76pfcZLmcfl_Symbol;
    "#,
    ),
    (
        "webgl_vendor",
        r#"
    const getParameter = WebGLRenderingContext.prototype.getParameter;
    WebGLRenderingContext.prototype.getParameter = function(parameter) {
        if (parameter === 37445) {
            return 'Intel Inc.';
        }
        if (parameter === 37446) {
            return 'Intel Iris OpenGL Engine';
        }
        return getParameter.call(this, parameter);
    };
    "#,
    ),
    (
        "hairline",
        r#"
    Object.defineProperty(HTMLElement.prototype, 'offsetHeight', {
        get: function() {
            if (this.id === 'modernizr') return 1;
            return this.getBoundingClientRect().height;
        }
    });
    "#,
    ),
];

/// Build the init script for the given language list.
///
/// Every patch runs in its own `try` block so one failing override (e.g. no
/// WebGL in headless mode) does not skip the rest.
pub fn init_script(languages: &[String]) -> String {
    let langs = serde_json::to_string(languages).unwrap_or_else(|_| "['en-US','en']".to_string());

    let mut script = format!("// stealth v{}\n(() => {{\n", STEALTH_VERSION);
    for (name, body) in STEALTH_PATCHES {
        let body = body.replace("__LANGUAGES__", &langs);
        script.push_str(&format!(
            "  try {{{}}} catch (e) {{ /* {} */ }}\n",
            body, name
        ));
    }
    script.push_str("})();\n");
    script
}

#[cfg(test)]
mod tests {
    use super::*;

    fn langs() -> Vec<String> {
        vec!["en-US".to_string(), "en".to_string()]
    }

    #[test]
    fn test_script_is_versioned_and_deterministic() {
        let a = init_script(&langs());
        let b = init_script(&langs());
        assert_eq!(a, b);
        assert!(a.starts_with(&format!("// stealth v{}", STEALTH_VERSION)));
    }

    #[test]
    fn test_script_contains_every_patch() {
        let script = init_script(&langs());
        for (name, _) in STEALTH_PATCHES {
            assert!(script.contains(&format!("/* {} */", name)), "missing {name}");
        }
        assert_eq!(script.matches("try {").count(), STEALTH_PATCHES.len());
    }

    #[test]
    fn test_masks_automation_and_fakes_navigator_lists() {
        let script = init_script(&langs());
        assert!(script.contains("'webdriver'"));
        assert!(script.contains("'plugins'"));
        assert!(script.contains(r#"get: () => ["en-US","en"]"#));
        assert!(!script.contains("__LANGUAGES__"));
    }
}
