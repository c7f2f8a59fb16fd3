use std::collections::VecDeque;
use std::error::Error;
use std::fs;
use std::path::{Path, PathBuf};

use narchi::{Architecture, Block, Registry, Resolution, ResolveOptions, Resolver, SymbolMap};
use rayon::prelude::*;

mod var_binding;
use var_binding::VarBinding;

/// Maximum depth of `_path` includes, which stops include cycles.
const MAX_INCLUDE_DEPTH: usize = 16;

struct Args {
    /// Architecture files to resolve.
    files: Vec<String>,

    /// Values for external variables.
    vars: Vec<VarBinding>,

    /// Print resolved architectures as JSON.
    json: bool,

    /// Reject variables which are not declared.
    strict: bool,

    /// Log the shape of every block.
    verbose: bool,
}

fn parse_args() -> Result<Args, lexopt::Error> {
    use lexopt::prelude::*;

    let mut values = VecDeque::new();
    let mut vars = Vec::new();
    let mut json = false;
    let mut strict = false;
    let mut verbose = false;

    let mut parser = lexopt::Parser::from_env();
    while let Some(arg) = parser.next()? {
        match arg {
            Value(val) => values.push_back(val.string()?),
            Short('d') | Long("var") => {
                let binding = parser.value()?.string()?;
                let binding =
                    VarBinding::parse(&binding).map_err(|e| lexopt::Error::Custom(e.into()))?;
                vars.push(binding);
            }
            Long("json") => json = true,
            Short('s') | Long("strict") => strict = true,
            Short('v') | Long("verbose") => verbose = true,
            Short('V') | Long("version") => {
                println!("narchi {}", env!("CARGO_PKG_VERSION"));
                std::process::exit(0);
            }
            Short('h') | Long("help") => {
                println!(
                    "Resolve the tensor shapes of neural network architectures.

Usage: {bin_name} [OPTIONS] <architecture>...

Options:

  -d, --var <name>=<value>

                 Set the value of an external variable. May be repeated.
                 The last value given for a name is used.

  --json         Print resolved architectures as JSON
  -s, --strict   Reject variables which are not declared in _ext_vars
  -v, --verbose  Log the shape of every block
  -V, --version  Print version
  -h, --help     Print help
",
                    bin_name = parser.bin_name().unwrap_or("narchi")
                );
                std::process::exit(0);
            }
            _ => return Err(arg.unexpected()),
        }
    }

    if values.is_empty() {
        return Err("missing `<architecture>` arg".into());
    }
    VarBinding::sort_dedup(&mut vars);

    Ok(Args {
        files: values.into(),
        vars,
        json,
        strict,
        verbose,
    })
}

/// Load an architecture file, inlining the architectures of `Module` blocks
/// which reference other files via `_path`.
///
/// Paths are relative to the directory of the file containing the block.
fn load_architecture(path: &Path, depth: usize) -> Result<Architecture, Box<dyn Error>> {
    if depth > MAX_INCLUDE_DEPTH {
        return Err(format!(
            "includes nested more than {} deep at \"{}\"",
            MAX_INCLUDE_DEPTH,
            path.display()
        )
        .into());
    }
    let json = fs::read_to_string(path)
        .map_err(|err| format!("failed to read \"{}\": {}", path.display(), err))?;
    let mut arch = Architecture::from_json(&json)
        .map_err(|err| format!("failed to parse \"{}\": {}", path.display(), err))?;

    let dir = path.parent().map(Path::to_path_buf).unwrap_or_default();
    inline_modules(&mut arch.blocks, &dir, depth)?;
    Ok(arch)
}

fn inline_modules(blocks: &mut [Block], dir: &Path, depth: usize) -> Result<(), Box<dyn Error>> {
    for block in blocks {
        inline_modules(&mut block.blocks, dir, depth)?;
        if let Some(body) = block.architecture.as_mut() {
            inline_modules(&mut body.blocks, dir, depth)?;
            continue;
        }
        if block.kind != "Module" {
            continue;
        }
        if let Some(include) = block.config.get_str("_path")? {
            let path: PathBuf = dir.join(include);
            log::debug!("Inlining \"{}\" into block \"{}\"", path.display(), block.id);
            block.architecture = Some(Box::new(load_architecture(&path, depth + 1)?));
        }
    }
    Ok(())
}

fn print_resolution(file: &str, resolution: &Resolution) {
    println!("{}:", file);

    // A structural error in the top-level scope means no block was resolved.
    let invalid_graph = resolution
        .errors()
        .iter()
        .any(|err| err.kind().is_structural() && err.path().len() == 1);
    if invalid_graph {
        println!("  (invalid graph, no blocks resolved)");
        return;
    }

    for port in resolution.inputs() {
        println!("  input  {}: {}", port.id, format_shape(port.shape.as_ref()));
    }
    for block in resolution.blocks() {
        println!(
            "  {} ({}): {}",
            block.id,
            block.kind,
            format_shape(block.shape.as_ref())
        );
    }
    for port in resolution.outputs() {
        let id = if port.id.is_empty() { "(last)" } else { &port.id };
        println!("  output {}: {}", id, format_shape(port.shape.as_ref()));
    }
}

fn format_shape(shape: Option<&narchi::Shape>) -> String {
    shape
        .map(|s| s.to_string())
        .unwrap_or_else(|| "(unresolved)".to_string())
}

/// Resolve the shapes of blocks in neural network architecture files.
///
/// ```
/// cargo run -p narchi-cli -- -d B=8 model.json
/// ```
///
/// Exits with a non-zero status if any architecture has errors. Set
/// `RUST_LOG=debug` for details of each resolution step.
fn main() -> Result<(), Box<dyn Error>> {
    let args = parse_args()?;

    let default_level = if args.verbose { "info" } else { "warn" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default_level))
        .init();

    let archs = args
        .files
        .iter()
        .map(|file| load_architecture(Path::new(file), 0))
        .collect::<Result<Vec<_>, _>>()?;

    let defaults = ResolveOptions::default();
    let options = ResolveOptions {
        strict_variables: args.strict || defaults.strict_variables,
        verbose: args.verbose || defaults.verbose,
        ..defaults
    };
    let vars: SymbolMap = args
        .vars
        .iter()
        .map(|var| (var.name.clone(), var.value))
        .collect();

    let registry = Registry::with_builtins();
    let resolver = Resolver::with_options(&registry, options);
    let resolutions: Vec<Resolution> = archs
        .par_iter()
        .map(|arch| resolver.resolve_with_vars(arch, &vars))
        .collect();

    let mut failed = false;
    for (file, resolution) in args.files.iter().zip(&resolutions) {
        if args.json {
            println!("{}", serde_json::to_string_pretty(resolution)?);
        } else {
            print_resolution(file, resolution);
        }
        for err in resolution.errors() {
            eprintln!("{}: {}", file, err);
        }
        failed |= !resolution.is_ok();
    }

    if failed {
        std::process::exit(1);
    }
    Ok(())
}
