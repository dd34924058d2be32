//! Bootstrap page rendering.

use minijinja::{context, AutoEscape, Environment};

/// Built-in bootstrap page.
pub const DEFAULT_TEMPLATE: &str = include_str!("../assets/index.html");

/// `os.Args[0]` of a module started by the loader script.
pub const PROGRAM_NAME: &str = "js";

/// Names the page needs to fetch the loader, the artifact and the wait endpoint.
#[derive(Debug, Clone)]
pub struct PageContext<'a> {
    pub runtime_script: &'a str,
    pub artifact: &'a str,
    pub wait_endpoint: &'a str,
    pub notify_endpoint: &'a str,
    pub argv: &'a [String],
}

/// Render `template` once. Output is not HTML-escaped; `argv` is inserted as a
/// JSON array that starts with [`PROGRAM_NAME`].
pub fn render_page(template: &str, page: &PageContext<'_>) -> Result<String, minijinja::Error> {
    let mut env = Environment::new();
    env.set_auto_escape_callback(|_| AutoEscape::None);
    env.add_template("index.html", template)?;

    let argv = script_argv(page.argv);
    env.get_template("index.html")?.render(context! {
        runtime_script => page.runtime_script,
        artifact => page.artifact,
        wait_endpoint => page.wait_endpoint,
        notify_endpoint => page.notify_endpoint,
        argv => argv,
    })
}

/// The module's full argument list as a JSON literal safe inside `<script>`.
fn script_argv(args: &[String]) -> String {
    let argv: Vec<&str> = std::iter::once(PROGRAM_NAME)
        .chain(args.iter().map(String::as_str))
        .collect();
    serde_json::to_string(&argv)
        .map(|json| json.replace('<', "\\u003c"))
        .unwrap_or_else(|_| format!("[\"{}\"]", PROGRAM_NAME))
}
