mod replay;
pub mod utils;

pub(crate) fn init_tracing() {
    let _ = oetrace::init_tracing();
}

fn main() {}
