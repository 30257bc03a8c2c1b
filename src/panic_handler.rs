use std::io::{self, Write};
use std::panic;

pub fn initialize_panic_handler() {
    better_panic::install();

    let default_hook = panic::take_hook();
    panic::set_hook(Box::new(move |panic_info| {
        let thread = std::thread::current();
        let thread_name = thread.name().unwrap_or("<unnamed>");
        log::error!("Panic on thread {thread_name}: {panic_info}");
        log::logger().flush();

        default_hook(panic_info);

        // Render workers recover from panicking jobs; only the main thread
        // takes the process down.
        if thread_name == "main" {
            let _ = io::stderr().flush();
            std::process::exit(1);
        }
    }));
}
