//! Watch mode: debounced filesystem invalidation plus the live-reload
//! channel.
//!
//! Each watch rule maps glob patterns to the chain of tasks re-run when a
//! matching file changes, followed by a reload signal. Rules are built once
//! at startup and never mutated; rapid changes inside the debounce window
//! coalesce into a single run of each affected chain. After a chain settles
//! the notifier always fires, even when tasks partially failed.

use std::collections::HashSet;
use std::env;
use std::net::{TcpListener, TcpStream};
use std::path::Path;
use std::sync::mpsc::Sender;
use std::sync::{Arc, Mutex};
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use camino::Utf8PathBuf;
use glob::Pattern;
use notify::{EventKind, RecursiveMode};
use notify_debouncer_full::new_debouncer;
use tungstenite::WebSocket;

use crate::config::{Config, Target};
use crate::error::{KarakuriError, WatchError};
use crate::reload::{ChannelNotifier, Notifier, NullNotifier, Signal};
use crate::site::Site;

const DEBOUNCE_WINDOW: Duration = Duration::from_millis(250);

pub(crate) struct WatchRule {
    patterns: Vec<Pattern>,
    pub chain: Vec<&'static str>,
    pub reload: Signal,
}

impl WatchRule {
    fn new(
        patterns: &[String],
        chain: Vec<&'static str>,
        reload: Signal,
    ) -> Result<Self, glob::PatternError> {
        Ok(Self {
            patterns: patterns
                .iter()
                .map(|p| Pattern::new(p))
                .collect::<Result<_, _>>()?,
            chain,
            reload,
        })
    }

    fn matches(&self, path: &Utf8PathBuf) -> bool {
        self.patterns.iter().any(|p| p.matches(path.as_str()))
    }
}

/// The rule table mirroring the planned graph: one rule per asset class,
/// sheet producers prepended before their consumers.
pub(crate) fn watch_rules(config: &Config) -> Result<Vec<WatchRule>, glob::PatternError> {
    let paths = &config.paths;
    let mut rules = vec![
        WatchRule::new(
            paths.templates.watch_patterns(),
            vec!["templates"],
            Signal::Reload,
        )?,
        WatchRule::new(
            paths.styles.watch_patterns(),
            vec!["styles"],
            Signal::RefreshStyles,
        )?,
        WatchRule::new(paths.scripts.watch_patterns(), vec!["scripts"], Signal::Reload)?,
        WatchRule::new(paths.fonts.watch_patterns(), vec!["fonts"], Signal::Reload)?,
        WatchRule::new(paths.copy.watch_patterns(), vec!["copy"], Signal::Reload)?,
        WatchRule::new(paths.images.watch_patterns(), vec!["raster"], Signal::Reload)?,
        WatchRule::new(paths.svg.watch_patterns(), vec!["svg"], Signal::Reload)?,
    ];

    if cfg!(feature = "image") && config.features.sprites {
        rules.push(WatchRule::new(
            paths.sprites.watch_patterns(),
            vec!["sprite", "raster"],
            Signal::Reload,
        )?);
    }

    if config.features.svg_sprites {
        rules.push(WatchRule::new(
            paths.svg_sprites.watch_patterns(),
            vec!["sprite-svg"],
            Signal::Reload,
        )?);
    }

    if config.features.icon_font {
        rules.push(WatchRule::new(
            paths.icon_glyphs.watch_patterns(),
            vec!["icon-font"],
            Signal::Reload,
        )?);
    }

    Ok(rules)
}

/// Select the rules affected by a batch of changed paths. Every rule appears
/// at most once no matter how many of its files changed, which collapses a
/// burst of events into a single run of the chain.
pub(crate) fn match_rules<'r>(
    rules: &'r [WatchRule],
    changed: &HashSet<Utf8PathBuf>,
) -> Vec<&'r WatchRule> {
    rules
        .iter()
        .filter(|rule| changed.iter().any(|path| rule.matches(path)))
        .collect()
}

pub(crate) fn watch(site: &Site) -> Result<(), KarakuriError> {
    let root = env::current_dir().map_err(WatchError::Io)?;
    let (tcp, port) = reserve_port(site.config().reload_port)?;
    let clients = Arc::new(Mutex::new(vec![]));

    let _thread_i = new_thread_ws_incoming(tcp, clients.clone());
    let (tx_reload, _thread_o) = new_thread_ws_reload(clients.clone());

    let notifier: Box<dyn Notifier> = if site.config().features.live_reload {
        Box::new(ChannelNotifier::new(tx_reload))
    } else {
        Box::new(NullNotifier)
    };

    let rules = watch_rules(site.config())?;

    let (tx, rx) = std::sync::mpsc::channel();
    let mut debouncer = new_debouncer(DEBOUNCE_WINDOW, None, tx).map_err(WatchError::Notify)?;
    debouncer
        .watch(
            Path::new(site.config().source_root.as_str()),
            RecursiveMode::Recursive,
        )
        .map_err(WatchError::Notify)?;

    site.run_scoped("build", Target::Build, None, Some(port))?;

    #[cfg(feature = "server")]
    let _thread_http = server::start(
        site.config().build_root.clone(),
        site.config().server_port,
    );

    tracing::info!("Watching {} for changes", site.config().source_root);

    while let Ok(events) = rx.recv().map_err(WatchError::Recv)? {
        let changed: HashSet<Utf8PathBuf> = events
            .iter()
            .filter(|de| {
                matches!(
                    de.event.kind,
                    EventKind::Create(..) | EventKind::Modify(..) | EventKind::Remove(..)
                )
            })
            .flat_map(|de| &de.event.paths)
            .filter_map(|path| {
                let path = path.strip_prefix(&root).unwrap_or(path.as_path());
                Utf8PathBuf::try_from(path.to_path_buf()).ok()
            })
            .collect();

        if changed.is_empty() {
            continue;
        }

        let matched = match_rules(&rules, &changed);
        if matched.is_empty() {
            continue;
        }

        let start = Instant::now();
        let mut reload = Signal::RefreshStyles;

        for rule in &matched {
            for task in &rule.chain {
                match site.run_scoped(task, Target::Build, None, Some(port)) {
                    Ok(summary) if !summary.success() => {
                        tracing::error!("Task '{task}' finished with failures");
                    }
                    Ok(_) => {}
                    Err(e) => tracing::error!("Task '{task}':\n{e}"),
                }
            }

            if rule.reload == Signal::Reload {
                reload = Signal::Reload;
            }
        }

        // Best-effort reload, regardless of partial failures above.
        match reload {
            Signal::Reload => notifier.reload(),
            Signal::RefreshStyles => notifier.refresh_styles(),
        }

        println!("Refreshed in {:?}", start.elapsed());
    }

    Ok(())
}

fn reserve_port(preferred: u16) -> Result<(TcpListener, u16), WatchError> {
    let listener = match TcpListener::bind(("127.0.0.1", preferred)) {
        Ok(sock) => sock,
        Err(_) => TcpListener::bind("127.0.0.1:0").map_err(WatchError::Bind)?,
    };

    let addr = listener.local_addr().map_err(WatchError::Bind)?;
    let port = addr.port();
    Ok((listener, port))
}

fn new_thread_ws_incoming(
    server: TcpListener,
    client: Arc<Mutex<Vec<WebSocket<TcpStream>>>>,
) -> JoinHandle<()> {
    std::thread::spawn(move || {
        for stream in server.incoming() {
            let Ok(stream) = stream else { continue };
            let Ok(socket) = tungstenite::accept(stream) else {
                continue;
            };
            client.lock().unwrap().push(socket);
        }
    })
}

fn new_thread_ws_reload(
    client: Arc<Mutex<Vec<WebSocket<TcpStream>>>>,
) -> (Sender<Signal>, JoinHandle<()>) {
    let (tx, rx) = std::sync::mpsc::channel::<Signal>();

    let thread = std::thread::spawn(move || {
        while let Ok(signal) = rx.recv() {
            let mut clients = client.lock().unwrap();
            let mut broken = vec![];

            for (i, socket) in clients.iter_mut().enumerate() {
                match socket.send(signal.as_message().into()) {
                    Ok(_) => {}
                    Err(tungstenite::error::Error::Io(e)) => {
                        if e.kind() == std::io::ErrorKind::BrokenPipe {
                            broken.push(i);
                        }
                    }
                    Err(e) => {
                        eprintln!("Error: {e:?}");
                    }
                }
            }

            for i in broken.into_iter().rev() {
                clients.remove(i);
            }

            // Close all but the last 10 connections
            let len = clients.len();
            if len > 10 {
                for mut socket in clients.drain(0..len - 10) {
                    socket.close(None).ok();
                }
            }
        }
    });

    (tx, thread)
}

#[cfg(feature = "server")]
mod server {
    use std::{net::SocketAddr, thread};

    use axum::Router;
    use camino::Utf8PathBuf;
    use console::style;
    use tower_http::services::ServeDir;

    pub fn start(dir: Utf8PathBuf, port: u16) -> thread::JoinHandle<Result<(), anyhow::Error>> {
        let url = style(format!("http://localhost:{port}/")).yellow();
        eprintln!("Starting a HTTP server on {url}");

        thread::spawn(move || {
            tokio::runtime::Builder::new_current_thread()
                .enable_all()
                .build()?
                .block_on(serve(dir, port))
        })
    }

    async fn serve(dir: Utf8PathBuf, port: u16) -> Result<(), anyhow::Error> {
        let address = SocketAddr::from(([127, 0, 0, 1], port));
        let address = tokio::net::TcpListener::bind(address).await?;

        let router = Router::new().fallback_service(ServeDir::new(dir.as_std_path()));

        axum::serve(address, router).await?;

        Ok(())
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_default_rules_compile() {
        let rules = watch_rules(&Config::default()).unwrap();
        assert!(rules.len() >= 7);
    }

    #[test]
    fn test_burst_of_changes_selects_each_rule_once() {
        let rules = watch_rules(&Config::default()).unwrap();

        let changed: HashSet<Utf8PathBuf> = [
            "src/style/main.scss",
            "src/style/partials/_nav.scss",
            "src/style/partials/_footer.scss",
        ]
        .into_iter()
        .map(Utf8PathBuf::from)
        .collect();

        let matched = match_rules(&rules, &changed);

        assert_eq!(matched.len(), 1);
        assert_eq!(matched[0].chain, ["styles"]);
        assert_eq!(matched[0].reload, Signal::RefreshStyles);
    }

    #[test]
    fn test_unrelated_paths_match_nothing() {
        let rules = watch_rules(&Config::default()).unwrap();

        let changed: HashSet<Utf8PathBuf> =
            [Utf8PathBuf::from("README.md")].into_iter().collect();

        assert!(match_rules(&rules, &changed).is_empty());
    }

    #[test]
    fn test_sprite_changes_run_producer_then_consumer() {
        let rules = watch_rules(&Config::default()).unwrap();

        let changed: HashSet<Utf8PathBuf> =
            [Utf8PathBuf::from("src/sprite/icons/cart.png")].into_iter().collect();

        let matched = match_rules(&rules, &changed);

        assert_eq!(matched.len(), 1);
        assert_eq!(matched[0].chain, ["sprite", "raster"]);
    }

    #[test]
    fn test_template_partial_triggers_templates() {
        let rules = watch_rules(&Config::default()).unwrap();

        let changed: HashSet<Utf8PathBuf> =
            [Utf8PathBuf::from("src/partials/header.html")].into_iter().collect();

        let matched = match_rules(&rules, &changed);

        assert_eq!(matched.len(), 1);
        assert_eq!(matched[0].chain, ["templates"]);
        assert_eq!(matched[0].reload, Signal::Reload);
    }
}
