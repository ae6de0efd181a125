//! userqueue demo -- drives two threads through the queue subsystem.
//!
//! Usage: `userqueue [config.toml]`

use std::path::Path;
use std::process::ExitCode;
use std::sync::{mpsc, Arc};

use userqueue::hook::HC_ACTION;
use userqueue::message::{WM_MOUSEMOVE, WM_QUIT, WM_USER};
use userqueue::{
    Config, HookParams, HookProcedure, HookType, Hwnd, ModuleId, PeekFlags, System, ThreadKind,
    WindowTable,
};

fn main() -> ExitCode {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    log::info!("userqueue v{}", env!("CARGO_PKG_VERSION"));

    let config = match std::env::args().nth(1) {
        Some(path) => match Config::load(Path::new(&path)) {
            Ok(config) => config,
            Err(e) => {
                log::error!("config: {e}");
                return ExitCode::FAILURE;
            }
        },
        None => Config::default(),
    };

    match run(config) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            log::error!("demo: {e}");
            ExitCode::FAILURE
        }
    }
}

fn run(config: Config) -> Result<(), Box<dyn std::error::Error>> {
    let windows = WindowTable::new();
    let system = System::with_windows(config, windows.clone())?;
    let main_thread = system.create_thread(ThreadKind::Win32);
    let main_queue = main_thread.queue().handle();
    let main_hwnd = windows.create_window(
        Some(main_queue),
        Arc::new(|_, call| {
            log::info!("demo: main window got {:#06x}", call.message);
            call.wparam as isize * 10
        }),
    );

    // Worker thread: pumps messages until WM_QUIT.
    let (tx, rx) = mpsc::channel();
    let (worker_id, worker) = system.spawn_thread(ThreadKind::Win32, move |t| {
        let _ = tx.send(t.queue().handle());
        loop {
            let msg = t.get_message(Hwnd::NULL, 0, 0);
            if msg.is_quit() {
                break;
            }
            t.dispatch_message(&msg);
        }
    })?;
    let worker_queue = rx.recv()?;

    // The worker's window calls back into the main thread before answering.
    let worker_hwnd = windows.create_window(
        Some(worker_queue),
        Arc::new(move |t, call| {
            let inner = t.send_message(main_hwnd, WM_USER + 1, call.wparam, 0).unwrap_or(0);
            inner + 1
        }),
    );
    let result = main_thread.send_message(worker_hwnd, WM_USER, 4, 0)?;
    log::info!("demo: mutual send returned {result}");

    // A burst of mouse moves collapses into one queued message.
    for x in 0..16 {
        main_thread.post_message(main_hwnd, WM_MOUSEMOVE, 0, x)?;
    }
    log::info!(
        "demo: 16 mouse moves left {} queued message(s)",
        main_thread.queue().posted_len()
    );
    while main_thread
        .peek_message(Hwnd::NULL, 0, 0, PeekFlags::REMOVE)
        .is_some()
    {}

    // Hook chain: a system hook behind two thread-local ones.
    for name in ["system", "first local", "second local"] {
        let target = (name != "system").then(|| main_thread.id());
        main_thread.set_windows_hook_ex(
            HookType::Cbt.raw(),
            HookProcedure::ansi(move |ctx, code, params| {
                log::info!("demo: CBT hook '{name}' called");
                ctx.call_next(code, params)
            }),
            ModuleId(1),
            target,
        )?;
    }
    let mut params = HookParams::value(main_thread.kind().representation(), 0, 0);
    main_thread.call_hooks(HookType::Cbt, HC_ACTION, &mut params);
    log::info!("demo: freed {} hook(s)", system.free_module_hooks(ModuleId(1)));

    main_thread.post_thread_message(worker_id, WM_QUIT, 0, 0)?;
    if worker.join().is_err() {
        log::error!("demo: worker thread panicked");
    }
    Ok(())
}
