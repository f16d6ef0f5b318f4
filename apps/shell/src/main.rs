/*
 * SPDX-License-Identifier: BlueOak-1.0.0
 */

//! The shell.
//!
//! Syntax: `command args ... [> output] [< input]`. Built-ins: ls, cat,
//! mkdir, touch, clear, help; anything else runs `/app/<command>` in a
//! forked child.

#![no_std]
#![no_main]

extern crate alloc;

use alloc::format;
use alloc::string::String;
use alloc::vec::Vec;

use rigel_user::io::getline;
use rigel_user::{print, println, syscall, NodeKind, OpenMode, TaskState};

#[no_mangle]
extern "C" fn main() -> i64 {
    println!("rigel shell; 'help' lists commands");

    loop {
        print!("$> ");
        let line = getline();
        let tokens = tokenize(&line);
        if tokens.is_empty() {
            continue;
        }

        let invocation = match parse(&tokens) {
            Ok(invocation) => invocation,
            Err(message) => {
                println!("syntax error: {}", message);
                continue;
            }
        };

        run(&invocation);
    }
}

struct Invocation {
    command: String,
    args: Vec<String>,
    input: Option<String>,
    output: Option<String>,
}

fn tokenize(line: &str) -> Vec<String> {
    line.split(' ')
        .filter(|token| !token.is_empty())
        .map(String::from)
        .collect()
}

/// statement: command arg* (('<' file) | ('>' file)){0,2}
fn parse(tokens: &[String]) -> Result<Invocation, &'static str> {
    let mut at = 0;

    let command = expect_word(tokens, &mut at).ok_or("expected command")?;

    let mut args = Vec::new();
    while at < tokens.len() && tokens[at] != "<" && tokens[at] != ">" {
        args.push(tokens[at].clone());
        at += 1;
    }

    let mut input = None;
    let mut output = None;
    for _ in 0..2 {
        if at >= tokens.len() {
            break;
        }
        match tokens[at].as_str() {
            "<" => {
                at += 1;
                if input.is_some() {
                    return Err("duplicate input redirect");
                }
                input = Some(expect_word(tokens, &mut at).ok_or("expected input file")?);
            }
            ">" => {
                at += 1;
                if output.is_some() {
                    return Err("duplicate output redirect");
                }
                output = Some(expect_word(tokens, &mut at).ok_or("expected output file")?);
            }
            _ => return Err("expected redirect"),
        }
    }

    if at != tokens.len() {
        return Err("trailing tokens");
    }

    Ok(Invocation {
        command,
        args,
        input,
        output,
    })
}

fn expect_word(tokens: &[String], at: &mut usize) -> Option<String> {
    if *at >= tokens.len() || tokens[*at] == "<" || tokens[*at] == ">" {
        return None;
    }
    let word = tokens[*at].clone();
    *at += 1;
    Some(word)
}

fn run(invocation: &Invocation) {
    let out = match invocation.command.as_str() {
        "help" => command_help(),
        "clear" => {
            // Scrollback wipe + home.
            print!("\x1b[3J\x1b[H\x1b[2J");
            return;
        }
        "ls" => command_ls(&invocation.args),
        "cat" => command_cat(&invocation.args, &invocation.input),
        "mkdir" => command_mkdir(&invocation.args),
        "touch" => command_touch(&invocation.args),
        _ => {
            command_external(invocation);
            return;
        }
    };

    match &invocation.output {
        None => print!("{}", out),
        Some(path) => {
            if write_file(path, out.as_bytes()).is_err() {
                println!("cannot write {}", path);
            }
        }
    }
}

fn command_help() -> String {
    let mut out = String::new();
    out.push_str("Syntax: command args ... [> output] [< input]\n");
    out.push_str("Commands:\n");
    for name in ["ls", "cat", "mkdir", "touch", "clear", "help"] {
        out.push_str("  ");
        out.push_str(name);
        out.push('\n');
    }
    out.push_str("Anything else runs /app/<command>.\n");
    out
}

fn command_ls(args: &[String]) -> String {
    if args.len() != 1 {
        return String::from("Usage: ls <path>\n");
    }

    let fd = syscall::open(&args[0], OpenMode::Read);
    if fd < 0 {
        return format!("Failed to open {}\n", args[0]);
    }

    let out = match syscall::get_children(fd) {
        Err(_) => format!("Failed to list {}\n", args[0]),
        Ok(children) if children.is_empty() => {
            format!("No file or directories in {}\n", args[0])
        }
        Ok(children) => {
            let mut out = String::new();
            for (name, _) in children {
                out.push_str(&name);
                out.push('\t');
            }
            out.push('\n');
            out
        }
    };
    syscall::close(fd);
    out
}

fn command_cat(args: &[String], input: &Option<String>) -> String {
    let path = match (args.first(), input) {
        (Some(path), _) => path,
        (None, Some(path)) => path,
        (None, None) => return String::from("Usage: cat <path>\n"),
    };

    let fd = syscall::open(path, OpenMode::Read);
    if fd < 0 {
        return format!("Failed to open {}\n", path);
    }

    let mut out = String::new();
    let mut buf = [0u8; 512];
    loop {
        let n = syscall::read(fd, &mut buf);
        if n <= 0 {
            break;
        }
        out.push_str(&String::from_utf8_lossy(&buf[..n as usize]));
    }
    syscall::close(fd);
    out
}

fn command_mkdir(args: &[String]) -> String {
    if args.len() != 1 {
        return String::from("Usage: mkdir <path>\n");
    }
    if syscall::create(&args[0], NodeKind::Directory) < 0 {
        return format!("Failed to create {}\n", args[0]);
    }
    String::new()
}

fn command_touch(args: &[String]) -> String {
    if args.len() != 1 {
        return String::from("Usage: touch <path>\n");
    }
    if syscall::create(&args[0], NodeKind::File) < 0 {
        return format!("Failed to create {}\n", args[0]);
    }
    String::new()
}

fn command_external(invocation: &Invocation) {
    if invocation.input.is_some() || invocation.output.is_some() {
        println!("redirects only apply to built-ins");
        return;
    }

    let image = format!("/app/{}", invocation.command);
    let probe = syscall::open(&image, OpenMode::Read);
    if probe < 0 {
        println!("unknown command {}", invocation.command);
        return;
    }
    syscall::close(probe);

    let child = syscall::fork();
    if child == 0 {
        syscall::exec(&image);
        println!("cannot exec {}", image);
        syscall::exit();
    }

    // Shuttle our own stdio to the child's fifos until it terminates.
    let child_in = syscall::open(&format!("/proc/{}/fifo/stdin", child), OpenMode::Write);
    let child_out = syscall::open(&format!("/proc/{}/fifo/stdout", child), OpenMode::Read);

    let mut buf = [0u8; 512];
    loop {
        let mut moved = false;

        let n = syscall::read(rigel_user::io::stdin(), &mut buf);
        if n > 0 && child_in >= 0 {
            syscall::write(child_in, &buf[..n as usize]);
            moved = true;
        }

        if child_out >= 0 {
            let n = syscall::read(child_out, &mut buf);
            if n > 0 {
                print!("{}", String::from_utf8_lossy(&buf[..n as usize]));
                moved = true;
            }
        }

        if syscall::task_stat(child as u64) == TaskState::Terminated {
            break;
        }
        if !moved {
            syscall::sleep_us(2_000);
        }
    }

    if child_in >= 0 {
        syscall::close(child_in);
    }
    if child_out >= 0 {
        syscall::close(child_out);
    }
}

fn write_file(path: &str, bytes: &[u8]) -> Result<(), ()> {
    let mut fd = syscall::open(path, OpenMode::Write);
    if fd < 0 {
        if syscall::create(path, NodeKind::File) < 0 {
            return Err(());
        }
        fd = syscall::open(path, OpenMode::Write);
        if fd < 0 {
            return Err(());
        }
    }

    let mut rest = bytes;
    while !rest.is_empty() {
        let n = syscall::write(fd, rest);
        if n <= 0 {
            syscall::close(fd);
            return Err(());
        }
        rest = &rest[n as usize..];
    }
    syscall::close(fd);
    Ok(())
}
