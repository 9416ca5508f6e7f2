use doctree::cli::{self, Invocation, USAGE};
use tracing::info;

fn fail(body: doctree::errors::ErrorBody) -> ! {
    println!("{}", cli::error_json(body));
    std::process::exit(1);
}

fn main() {
    doctree::logging::init();

    let inv = match Invocation::parse(std::env::args().skip(1)) {
        Ok(inv) => inv,
        Err(e) => fail(cli::error_body(&e, "Usage")),
    };
    if inv.help {
        println!("{USAGE}");
        return;
    }
    let Some(command) = inv.command.as_deref() else {
        eprintln!("{USAGE}");
        fail(cli::error_body(&anyhow::anyhow!("no command given"), "Usage"));
    };

    let mut tree = match cli::open(&inv.config_path) {
        Ok(tree) => tree,
        Err(e) => fail(cli::error_body(&e, "Config")),
    };

    info!(
        host_root = %tree.provider().host_root().display(),
        permission_path = %tree.scope().permission_path(),
        command = %command,
        "doctree ready"
    );

    match cli::run(&mut tree, command, &inv.operands, inv.kind, inv.b64) {
        Ok(out) => println!("{out}"),
        Err(e) => fail(cli::error_body(&e, "Usage")),
    }
}
