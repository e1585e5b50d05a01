// knp_linux_mcu/src/console.rs
// Pseudo-terminal the host connects to. A reader thread plays the part of the
// receive interrupt: it blocks on the master side and hands bytes over
// through a short critical section.

use std::collections::VecDeque;
use std::ffi::CStr;
use std::fs::File;
use std::io::{Read, Write};
use std::os::fd::{AsRawFd, FromRawFd, RawFd};
use std::os::unix::fs::OpenOptionsExt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use log::{error, info};
use parking_lot::{Condvar, Mutex};

#[derive(Default)]
struct RxShared {
    bytes: Mutex<VecDeque<u8>>,
    ready: Condvar,
}

pub struct Console {
    master: File,
    // Held open so the master never reports a hangup while no host is
    // attached.
    _slave: File,
    link: PathBuf,
    rx: Arc<RxShared>,
}

fn check(ret: libc::c_int, what: &str) -> Result<libc::c_int> {
    if ret < 0 {
        return Err(std::io::Error::last_os_error()).context(what.to_string());
    }
    Ok(ret)
}

fn set_raw(fd: RawFd) -> Result<()> {
    // SAFETY: termios is plain data; tcgetattr fills it for a valid fd.
    unsafe {
        let mut tio: libc::termios = std::mem::zeroed();
        check(libc::tcgetattr(fd, &mut tio), "tcgetattr")?;
        libc::cfmakeraw(&mut tio);
        check(libc::tcsetattr(fd, libc::TCSANOW, &tio), "tcsetattr")?;
    }
    Ok(())
}

impl Console {
    /// Create the pty, put it in raw mode, publish the slave at `link` and
    /// start the reader thread.
    pub fn open(link: &Path) -> Result<Self> {
        // SAFETY: plain libc calls on a descriptor this function owns; every
        // return value is checked before use.
        let (master, slave_path) = unsafe {
            let fd = check(libc::posix_openpt(libc::O_RDWR | libc::O_NOCTTY), "posix_openpt")?;
            let master = File::from_raw_fd(fd);
            check(libc::grantpt(fd), "grantpt")?;
            check(libc::unlockpt(fd), "unlockpt")?;
            let mut name = [0 as libc::c_char; 128];
            if libc::ptsname_r(fd, name.as_mut_ptr(), name.len()) != 0 {
                bail!("ptsname_r failed");
            }
            let path = CStr::from_ptr(name.as_ptr())
                .to_str()
                .context("pty name is not utf-8")?
                .to_owned();
            (master, PathBuf::from(path))
        };
        let slave = File::options()
            .read(true)
            .write(true)
            .custom_flags(libc::O_NOCTTY)
            .open(&slave_path)
            .with_context(|| format!("opening {}", slave_path.display()))?;
        set_raw(slave.as_raw_fd())?;

        if link.symlink_metadata().is_ok() {
            std::fs::remove_file(link).with_context(|| format!("removing stale {}", link.display()))?;
        }
        std::os::unix::fs::symlink(&slave_path, link)
            .with_context(|| format!("linking {} -> {}", link.display(), slave_path.display()))?;
        info!("serial console at {} ({})", link.display(), slave_path.display());

        let rx = Arc::new(RxShared::default());
        let reader = master.try_clone().context("cloning pty master")?;
        let shared = Arc::clone(&rx);
        thread::Builder::new()
            .name("console-rx".into())
            .spawn(move || reader_thread(reader, shared))
            .context("spawning console reader")?;

        Ok(Self {
            master,
            _slave: slave,
            link: link.to_path_buf(),
            rx,
        })
    }

    /// Wait up to `timeout` for received bytes and move them into `out`.
    pub fn wait_rx(&self, timeout: Duration, out: &mut Vec<u8>) {
        let mut bytes = self.rx.bytes.lock();
        if bytes.is_empty() && !timeout.is_zero() {
            self.rx.ready.wait_for(&mut bytes, timeout);
        }
        out.extend(bytes.drain(..));
    }

    pub fn write(&mut self, data: &[u8]) -> Result<()> {
        self.master.write_all(data).context("writing to pty")
    }
}

impl Drop for Console {
    fn drop(&mut self) {
        let _ = std::fs::remove_file(&self.link);
    }
}

fn reader_thread(mut master: File, shared: Arc<RxShared>) {
    let mut buf = [0u8; 4096];
    loop {
        match master.read(&mut buf) {
            Ok(0) => {
                info!("console closed");
                return;
            }
            Ok(n) => {
                shared.bytes.lock().extend(&buf[..n]);
                shared.ready.notify_one();
            }
            Err(e) if e.kind() == std::io::ErrorKind::Interrupted => continue,
            Err(e) => {
                error!("console read failed: {}", e);
                return;
            }
        }
    }
}
