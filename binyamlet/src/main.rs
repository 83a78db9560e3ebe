//! Command-line tool for checking and reformatting YAML documents.
//!
//! Usage: yamlet [OPTIONS] [FILE]
//!
//! Options:
//!   --check            Check that the input is valid (exit 0 if valid, 1 if not)
//!   --canonical        Tag every scalar with its `!!type` and quote strings
//!   --flow             Render nested collections in flow style
//!   --stream           Emit the elements of a root sequence as separate documents
//!   --indent <N>       Spaces per block indentation level [default: 2]
//!   --schema <NAME>    Resolution schema (failsafe, json, core) [default: core]
//!   -o, --output <FILE> Write output to the specified file
//!   -h, --help         Print help
//!   -V, --version      Print version

use libyamlet::{compose_all, to_yaml_lines, ComposeOptions, EmitOptions, Schema, Shape};
use std::fs;
use std::io::{self, Read};
use std::process;

fn main() {
    let args: Vec<String> = std::env::args().collect();

    let mut check_only = false;
    let mut canonical = false;
    let mut flow = false;
    let mut stream = false;
    let mut indent: usize = 2;
    let mut schema = Schema::Core;
    let mut output_file: Option<&str> = None;
    let mut input_path: Option<&str> = None;

    let mut i = 1;
    while i < args.len() {
        match args[i].as_str() {
            "-h" | "--help" => {
                print_help();
                return;
            }
            "-V" | "--version" => {
                println!("yamlet {}", env!("CARGO_PKG_VERSION"));
                return;
            }
            "--check" => {
                check_only = true;
            }
            "--canonical" => {
                canonical = true;
            }
            "--flow" => {
                flow = true;
            }
            "--stream" => {
                stream = true;
            }
            "--indent" => {
                i += 1;
                if i >= args.len() {
                    eprintln!("Error: --indent requires an argument");
                    process::exit(1);
                }
                indent = match args[i].parse() {
                    Ok(n) if n >= 1 => n,
                    _ => {
                        eprintln!("Error: --indent requires a positive number, got {}", args[i]);
                        process::exit(1);
                    }
                };
            }
            "--schema" => {
                i += 1;
                if i >= args.len() {
                    eprintln!("Error: --schema requires an argument");
                    process::exit(1);
                }
                schema = match Schema::from_name(&args[i]) {
                    Some(schema) => schema,
                    None => {
                        eprintln!("Error: Unknown schema: {}", args[i]);
                        process::exit(1);
                    }
                };
            }
            "-o" | "--output" => {
                i += 1;
                if i >= args.len() {
                    eprintln!("Error: --output requires an argument");
                    process::exit(1);
                }
                output_file = Some(&args[i]);
            }
            "-" => {
                // Explicit stdin
                // input_path stays None, which means stdin
            }
            arg if arg.starts_with('-') => {
                eprintln!("Error: Unknown option: {}", arg);
                process::exit(1);
            }
            _ => {
                if input_path.is_some() {
                    eprintln!("Error: Multiple input paths not supported");
                    process::exit(1);
                }
                input_path = Some(&args[i]);
            }
        }
        i += 1;
    }

    let input = match input_path {
        Some(path) => match fs::read_to_string(path) {
            Ok(text) => text,
            Err(e) => {
                eprintln!("Error reading {}: {}", path, e);
                process::exit(1);
            }
        },
        None => {
            let mut buffer = String::new();
            if let Err(e) = io::stdin().read_to_string(&mut buffer) {
                eprintln!("Error reading stdin: {}", e);
                process::exit(1);
            }
            buffer
        }
    };

    let options = ComposeOptions {
        schema,
        ..ComposeOptions::default()
    };
    let filename = input_path.unwrap_or("stdin");
    let documents = match compose_all(&input, &options, &Shape::Any) {
        Ok(documents) => documents,
        Err(e) => {
            eprintln!("Error: {}", e.in_file(filename));
            process::exit(1);
        }
    };

    if check_only {
        println!("ok");
        return;
    }

    let emit_options = EmitOptions {
        indentation_policy: indent,
        canonical,
        flow_style: flow,
        is_stream: stream,
        schema,
        ..EmitOptions::default()
    };
    let mut lines: Vec<String> = Vec::new();
    for (n, document) in documents.iter().enumerate() {
        if n > 0 {
            lines.push("---".to_string());
        }
        lines.extend(to_yaml_lines(document, &emit_options));
    }
    let mut text = lines.join("\n");
    text.push('\n');

    match output_file {
        Some(path) => {
            if let Err(e) = fs::write(path, &text) {
                eprintln!("Error writing {}: {}", path, e);
                process::exit(1);
            }
        }
        None => print!("{}", text),
    }
}

fn print_help() {
    println!("yamlet - check and reformat YAML documents");
    println!();
    println!("Usage: yamlet [OPTIONS] [FILE]");
    println!();
    println!("Reads FILE, or stdin when FILE is omitted or '-'.");
    println!();
    println!("Options:");
    println!("  --check            Check that the input is valid (exit 0 if valid, 1 if not)");
    println!("  --canonical        Tag every scalar with its !!type and quote strings");
    println!("  --flow             Render nested collections in flow style");
    println!("  --stream           Emit the elements of a root sequence as separate documents");
    println!("  --indent <N>       Spaces per block indentation level [default: 2]");
    println!("  --schema <NAME>    Resolution schema (failsafe, json, core) [default: core]");
    println!("  -o, --output <FILE>  Write output to the specified file");
    println!("  -h, --help         Print help");
    println!("  -V, --version      Print version");
}
