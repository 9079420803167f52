//! Header Demo
//!
//! Mounts an application whose header changes two seconds after mount, and
//! prints the document before and after.
//!
//! Run with: cargo run -p weave_app --example header

use std::time::Duration;

use weave_app::logging;
use weave_app::prelude::*;

#[derive(Default)]
struct App;

impl Component for App {
    fn template(&self, _cx: &ComponentInstance) -> String {
        "<div><h1>{state.header}</h1><badge label=\"beta\"></badge></div>".into()
    }

    fn initial_state(&self) -> StateMap {
        state_map([("header", Value::from("Application"))])
    }

    fn used_components(&self) -> Vec<ComponentClass> {
        vec![ComponentClass::of::<Badge>("Badge")]
    }

    fn after_mount(&self, cx: &ComponentInstance) -> Result<()> {
        let state = cx.state_handle();
        cx.runtime()
            .scheduler()
            .schedule(Duration::from_secs(2), move || state.set("header", "New App"));
        Ok(())
    }
}

#[derive(Default)]
struct Badge;

impl Component for Badge {
    fn template(&self, _cx: &ComponentInstance) -> String {
        "<small class=\"badge\">{params.label}</small>".into()
    }
}

fn main() -> anyhow::Result<()> {
    let config = AppConfig::default().with_title("Header Demo");
    logging::init(&config.log_filter);

    let mut app = WeaveApp::new(config)?;
    let root = app.mount(&ComponentClass::of::<App>("App"))?;
    println!("mounted {} ({} children)", root.id(), root.child_count());
    println!("{}", app.markup());

    app.advance(Duration::from_secs(2))?;
    println!("{}", app.markup());
    println!("report: {:?}", root.last_report());

    Ok(())
}
