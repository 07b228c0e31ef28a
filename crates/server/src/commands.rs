//! The vanilla command set: `cd`/`pwd`/`home`/`ls`/`open`/`close` plus the
//! minimal reserved file-stream handlers, registered into a fresh
//! [`CommandRegistry`] by [`vanilla_commands`].

use std::fs::OpenOptions;
use std::io::{Read, Seek, SeekFrom, Write};
use std::sync::Arc;

use sfap_protocol::{open_mode, AccessResult, Command, CommandRegistry, FileType};
use sfap_wire::Stream;

use crate::error::HandlerError;
use crate::session::{CommandHandler, Session};

fn open_options(mode: u32) -> OpenOptions {
    let mut options = OpenOptions::new();
    let writable = mode & (open_mode::WRITE | open_mode::APPEND) != 0;

    options.read(mode & open_mode::READ != 0 || !writable);
    options.write(writable);
    options.append(mode & open_mode::APPEND != 0);
    options.truncate(mode & open_mode::TRUNC != 0 && writable);
    options.create(writable);
    options
}

fn normalized_host_path(session: &Session, virtual_path: &str) -> Result<Option<std::path::PathBuf>, HandlerError> {
    session.with_sandbox(|sandbox| {
        sandbox
            .try_normalize(virtual_path)
            .and_then(|normalized| sandbox.to_system(&normalized).ok())
    })
}

fn cmd_cd(session: &Session, stream: &Stream) -> Result<(), HandlerError> {
    let path = stream.recv_path()?;

    let result = session.with_sandbox_mut(|sandbox| sandbox.cd(&path))?;

    stream.send_enum(result)?;

    if result == AccessResult::Ok {
        let cwd = session.with_sandbox(|sandbox| sandbox.cwd().to_string())?;
        stream.send_path(&cwd)?;
    }

    Ok(())
}

fn cmd_pwd(session: &Session, stream: &Stream) -> Result<(), HandlerError> {
    let cwd = session.with_sandbox(|sandbox| sandbox.cwd().to_string())?;
    stream.send_path(&cwd)?;
    Ok(())
}

fn cmd_home(session: &Session, stream: &Stream) -> Result<(), HandlerError> {
    let home = session.with_sandbox(|sandbox| sandbox.home().to_string())?;
    stream.send_path(&home)?;
    Ok(())
}

fn cmd_ls(session: &Session, stream: &Stream) -> Result<(), HandlerError> {
    let path = stream.recv_path()?;

    let Some(host_path) = normalized_host_path(session, &path)? else {
        stream.send_enum(AccessResult::AccessDenied)?;
        return Ok(());
    };

    if !host_path.is_dir() {
        stream.send_enum(AccessResult::IsNotDirectory)?;
        return Ok(());
    }

    let Ok(entries) = std::fs::read_dir(&host_path) else {
        stream.send_enum(AccessResult::InternalError)?;
        return Ok(());
    };

    let mut rows = Vec::new();
    for entry in entries {
        let Ok(entry) = entry else {
            stream.send_enum(AccessResult::InternalError)?;
            return Ok(());
        };

        let Some(virtual_path) = session.with_sandbox(|sandbox| sandbox.try_to_virtual(&entry.path()))? else {
            continue;
        };

        let file_type = entry.file_type().map_or(FileType::Unknown, FileType::from);
        let size = entry.metadata().map_or(0, |m| if m.is_file() { m.len() } else { 0 });

        rows.push((file_type, virtual_path, size));
    }

    stream.send_enum(AccessResult::Ok)?;
    stream.send_u32(rows.len() as u32)?;
    for (file_type, virtual_path, size) in rows {
        stream.send_enum(file_type)?;
        stream.send_path(&virtual_path)?;
        stream.send_u64(size)?;
    }

    Ok(())
}

fn cmd_open(session: &Session, stream: &Stream) -> Result<(), HandlerError> {
    let path = stream.recv_path()?;
    let mode = stream.recv_u32()?;

    let Some(host_path) = normalized_host_path(session, &path)? else {
        stream.send_enum(AccessResult::AccessDenied)?;
        return Ok(());
    };

    match open_options(mode).open(&host_path) {
        Ok(mut file) => {
            if mode & open_mode::AT_END != 0 {
                let _ = file.seek(SeekFrom::End(0));
            }
            stream.send_enum(AccessResult::Ok)?;
            stream.send_u32(session.add_descriptor(file))?;
        }
        Err(_) => stream.send_enum(AccessResult::CantOpenFile)?,
    }

    Ok(())
}

fn cmd_close(session: &Session, stream: &Stream) -> Result<(), HandlerError> {
    let descriptor = stream.recv_u32()?;
    session.close_descriptor(descriptor);
    Ok(())
}

fn cmd_write(session: &Session, stream: &Stream) -> Result<(), HandlerError> {
    let descriptor = stream.recv_u32()?;
    let data = stream.recv_blob()?;

    let written = session.with_descriptor_mut(descriptor, |file| file.write_all(&data).map(|()| data.len() as u64));

    match written {
        Some(Ok(written)) => {
            stream.send_enum(AccessResult::Ok)?;
            stream.send_u64(written)?;
        }
        Some(Err(_)) => stream.send_enum(AccessResult::InternalError)?,
        None => stream.send_enum(AccessResult::AccessDenied)?,
    }

    Ok(())
}

fn cmd_read(session: &Session, stream: &Stream) -> Result<(), HandlerError> {
    let descriptor = stream.recv_u32()?;
    let count = stream.recv_u64()? as usize;

    let read = session.with_descriptor_mut(descriptor, |file| {
        let mut buffer = vec![0u8; count];
        file.read(&mut buffer).map(|n| {
            buffer.truncate(n);
            buffer
        })
    });

    match read {
        Some(Ok(buffer)) => {
            stream.send_enum(AccessResult::Ok)?;
            stream.send_blob(&buffer)?;
        }
        Some(Err(_)) => stream.send_enum(AccessResult::InternalError)?,
        None => stream.send_enum(AccessResult::AccessDenied)?,
    }

    Ok(())
}

/// `SEEKG` and `SEEKP` share one handler: a host `File` has a single cursor,
/// unlike a C++ `fstream`'s independent get/put positions.
fn cmd_seek(session: &Session, stream: &Stream) -> Result<(), HandlerError> {
    let descriptor = stream.recv_u32()?;
    let position = stream.recv_u64()?;

    let seeked = session.with_descriptor_mut(descriptor, |file| file.seek(SeekFrom::Start(position)));

    match seeked {
        Some(Ok(_)) => stream.send_enum(AccessResult::Ok)?,
        Some(Err(_)) => stream.send_enum(AccessResult::InternalError)?,
        None => stream.send_enum(AccessResult::AccessDenied)?,
    }

    Ok(())
}

/// `TELLG` and `TELLP` share one handler, for the same reason as [`cmd_seek`].
fn cmd_tell(session: &Session, stream: &Stream) -> Result<(), HandlerError> {
    let descriptor = stream.recv_u32()?;

    let position = session.with_descriptor_mut(descriptor, std::io::Seek::stream_position);

    match position {
        Some(Ok(position)) => {
            stream.send_enum(AccessResult::Ok)?;
            stream.send_u64(position)?;
        }
        Some(Err(_)) => stream.send_enum(AccessResult::InternalError)?,
        None => stream.send_enum(AccessResult::AccessDenied)?,
    }

    Ok(())
}

fn cmd_iostate(session: &Session, stream: &Stream) -> Result<(), HandlerError> {
    let descriptor = stream.recv_u32()?;

    let eof = session.with_descriptor_mut(descriptor, |file| {
        let position = file.stream_position()?;
        let len = file.metadata()?.len();
        std::io::Result::Ok(position >= len)
    });

    match eof {
        Some(Ok(eof)) => {
            stream.send_enum(AccessResult::Ok)?;
            stream.send_bool(eof)?;
        }
        Some(Err(_)) => stream.send_enum(AccessResult::InternalError)?,
        None => stream.send_enum(AccessResult::AccessDenied)?,
    }

    Ok(())
}

fn handler(f: fn(&Session, &Stream) -> Result<(), HandlerError>) -> CommandHandler {
    Arc::new(f)
}

/// Builds a fresh registry holding the default `cd`/`pwd`/`home`/`ls`/
/// `open`/`close` handlers plus the reserved file-stream ops, mirroring
/// `protocol::vanilla_commands` in the original implementation. The
/// always-allowed commands (`NONE`, `BYE`, `SERVER_INFO`, ...) are not
/// registered here: they never reach [`CommandRegistry::get`], since the
/// session loop runs their built-in handler directly (`spec.md` §4.4 step 5).
#[must_use]
pub fn vanilla_commands() -> CommandRegistry<CommandHandler> {
    let registry = CommandRegistry::new();

    registry.add(Command::Cd.id(), Command::Cd.name(), handler(cmd_cd)).expect("unique vanilla ids");
    registry.add(Command::Pwd.id(), Command::Pwd.name(), handler(cmd_pwd)).expect("unique vanilla ids");
    registry.add(Command::Home.id(), Command::Home.name(), handler(cmd_home)).expect("unique vanilla ids");
    registry.add(Command::Ls.id(), Command::Ls.name(), handler(cmd_ls)).expect("unique vanilla ids");
    registry.add(Command::Open.id(), Command::Open.name(), handler(cmd_open)).expect("unique vanilla ids");
    registry.add(Command::Close.id(), Command::Close.name(), handler(cmd_close)).expect("unique vanilla ids");
    registry.add(Command::Write.id(), Command::Write.name(), handler(cmd_write)).expect("unique vanilla ids");
    registry.add(Command::Read.id(), Command::Read.name(), handler(cmd_read)).expect("unique vanilla ids");
    registry.add(Command::SeekG.id(), Command::SeekG.name(), handler(cmd_seek)).expect("unique vanilla ids");
    registry.add(Command::TellG.id(), Command::TellG.name(), handler(cmd_tell)).expect("unique vanilla ids");
    registry.add(Command::SeekP.id(), Command::SeekP.name(), handler(cmd_seek)).expect("unique vanilla ids");
    registry.add(Command::TellP.id(), Command::TellP.name(), handler(cmd_tell)).expect("unique vanilla ids");
    registry
        .add(Command::IoState.id(), Command::IoState.name(), handler(cmd_iostate))
        .expect("unique vanilla ids");

    registry
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn vanilla_commands_registers_every_non_always_allowed_command() {
        let registry = vanilla_commands();

        assert_eq!(registry.size(), 13);
        assert!(registry.exists(Command::Cd.id()));
        assert!(registry.exists(Command::Open.id()));
        assert!(registry.exists(Command::IoState.id()));
    }

    #[test]
    fn open_options_read_mode_does_not_create() {
        let options = open_options(open_mode::READ);
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("missing.txt");

        assert!(options.open(missing).is_err());
    }

    #[test]
    fn open_options_write_mode_creates_and_truncates() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("f.txt");
        std::fs::write(&path, b"old").unwrap();

        let mut file = open_options(open_mode::WRITE | open_mode::TRUNC).open(&path).unwrap();
        file.write_all(b"new").unwrap();
        drop(file);

        assert_eq!(std::fs::read(&path).unwrap(), b"new");
    }
}
