//! vga16-splash: show an animated splash on a vga16fb console
//!
//! Switches the VT to graphics mode, draws a gradient with a throbber and
//! animates it until `q`/Esc is pressed or the frame limit is reached.
//! Logging follows `RUST_LOG`.

use std::cell::Cell;
use std::path::PathBuf;
use std::process::ExitCode;
use std::rc::Rc;
use std::time::Duration;

use clap::Parser;
use log::{error, info, warn};

use vga16fb::splash::{Splash, Theme};
use vga16fb::{
    create_backend, KeyBuffer, PollEventLoop, RendererBackend, Result, Terminal, Vga16Backend,
    Vga16Error, VirtualTerminal,
};

const FRAME_INTERVAL: Duration = Duration::from_millis(120);
const ESC: u8 = 0x1B;

#[derive(Parser)]
#[command(name = "vga16-splash")]
#[command(about = "Animated splash on a vga16fb framebuffer", long_about = None)]
struct Cli {
    /// Framebuffer device (defaults to $FRAMEBUFFER, then /dev/fb0)
    #[arg(short, long, value_name = "DEVICE")]
    device: Option<PathBuf>,

    /// Virtual terminal to draw on
    #[arg(short, long, value_name = "TTY", default_value = "/dev/tty1")]
    tty: PathBuf,

    /// Stop after this many frames instead of waiting for a key
    #[arg(short, long)]
    frames: Option<u64>,

    /// Title drawn above the throbber
    #[arg(long, default_value = "vga16 splash")]
    title: String,
}

fn main() -> ExitCode {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let cli = Cli::parse();
    match run(&cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(Vga16Error::UnsupportedMode { .. }) => {
            error!("this backend only drives vga16fb; check the console driver");
            ExitCode::FAILURE
        }
        Err(err) => {
            error!("{}", err);
            ExitCode::FAILURE
        }
    }
}

fn run(cli: &Cli) -> Result<()> {
    let terminal = Rc::new(VirtualTerminal::new(&cli.tty));
    let event_loop = Rc::new(PollEventLoop::new());
    let mut backend = create_backend(cli.device.as_deref(), terminal.clone(), event_loop.clone());
    info!(
        "drawing on {} over {}",
        backend.device_path().display(),
        terminal.path().display()
    );

    let result = backend
        .open_device()
        .and_then(|()| show_splash(&mut backend, &terminal, &event_loop, cli));

    backend.close_device();
    terminal.close();
    result
}

fn show_splash(
    backend: &mut Vga16Backend,
    terminal: &VirtualTerminal,
    event_loop: &PollEventLoop,
    cli: &Cli,
) -> Result<()> {
    backend.query_device()?;
    backend.map_to_device()?;

    let Some(&head) = backend.heads().first() else {
        return Err(Vga16Error::HeadNotInitialized);
    };
    let area = backend.head_area();
    info!("head is {}x{}", area.size.width, area.size.height);

    let quit = Rc::new(Cell::new(false));
    let source = backend.input_source();
    let flag = quit.clone();
    backend.set_handler_for_input_source(
        source,
        Box::new(move |keys: &mut KeyBuffer| {
            if keys.bytes().iter().any(|&b| b == b'q' || b == ESC) {
                flag.set(true);
            }
            keys.clear();
        }),
    )?;
    backend.open_input_source(source)?;

    let splash = Splash::new(Theme::midnight(), cli.title.as_str());
    if let Some(mut buffer) = backend.buffer_for_head(head) {
        splash.draw_background(&mut buffer);
    }

    let mut frame = 0;
    while !quit.get() && cli.frames.map_or(true, |limit| frame < limit) {
        if let Some(mut buffer) = backend.buffer_for_head(head) {
            splash.draw_frame(&mut buffer, frame);
        }
        backend.flush_head(head)?;

        if let Err(err) = event_loop.run_once(Some(FRAME_INTERVAL)) {
            warn!("event loop failed: {}", err);
            break;
        }
        terminal.poll_active_vt();
        frame += 1;
    }

    info!("{} frames, {} palette entries", frame, backend.palette().len());
    backend.close_input_source(source)?;
    backend.unmap_from_device();
    Ok(())
}
