//! The operator-facing side of the controller.

/// Receives what an operator would see: a status line that is replaced on
/// every update, and error notifications that demand attention.
pub trait Surface: Send + 'static {
    fn status(&self, text: &str);

    fn notify_error(&self, text: &str);
}

/// Prints to the terminal. Status goes to stdout, notifications to stderr.
#[derive(Debug, Default, Clone, Copy)]
pub struct Console;

impl Surface for Console {
    fn status(&self, text: &str) {
        println!("{text}");
    }

    fn notify_error(&self, text: &str) {
        eprintln!("Error: {text}");
    }
}
