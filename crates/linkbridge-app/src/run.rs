use std::{
    cell::RefCell,
    net::{IpAddr, Ipv4Addr, SocketAddr},
    rc::Rc,
    sync::{Arc, atomic::{AtomicBool, Ordering}},
    time::Duration as StdDuration,
};

use linkbridge_bridge::{SerialBridge, VncBridge};
use linkbridge_net::Reactor;
use linkbridge_timing::Duration as LbDuration;
use linkbridge_tlv::{Tlv, UartPort, tlv_poll_uart};
use tracing::{info, warn};

use crate::{config::Config, error::AppError, serial_port::DeviceUart};

/// TLV channel assignments (SPEC_FULL §6): `CONTROL=0` is handled internally
/// by the framer and never registered here.
const HID_CHANNEL: u8 = 1;
const PIPE_CHANNEL: u8 = 2;
const DEBUG_CHANNEL: u8 = 3;

const REACTOR_POLL_TIMEOUT: StdDuration = StdDuration::from_millis(20);
const UART_POLL_TIMEOUT: StdDuration = StdDuration::from_millis(5);

/// Opens the configured serial device and runs the bridge until `SIGINT`/
/// `SIGTERM` requests a clean shutdown.
pub fn run(config: Config) -> Result<(), AppError> {
    let device = config.device.clone().ok_or(AppError::NoDeviceConfigured)?;
    let port = DeviceUart::open(&device, config.baud).map_err(|e| AppError::SerialOpen(device.clone(), e))?;
    let running = install_shutdown_handler()?;
    run_with_port(config, port, running)
}

/// The single-threaded run loop (SPEC_FULL §4.8): owns the UART, the TLV
/// framer, and both bridge engines, and drives them in lockstep — poll the
/// TCP reactor, drain ready UART bytes into the deframer, run each bridge's
/// deferred-drain pass, repeat, until `running` goes false.
///
/// Takes the shutdown flag as a parameter (rather than installing the
/// `ctrlc` handler itself) so tests can drive a bounded number of
/// iterations without touching process-wide signal state.
pub fn run_with_port<P: UartPort>(config: Config, mut port: P, running: Arc<AtomicBool>) -> Result<(), AppError> {
    if config.vnc_password != crate::config::DEFAULT_VNC_PASSWORD {
        warn!(
            "configured vnc password differs from the compiled-in default; the RFB auth \
             challenge/response pair is a compile-time constant (see DESIGN.md), so this has no effect \
             without rebuilding linkbridge-rfb"
        );
    }

    let mut reactor = Reactor::new()?;
    let loopback = SocketAddr::new(IpAddr::V4(Ipv4Addr::UNSPECIFIED), config.serial_port);
    let vnc_addr = SocketAddr::new(IpAddr::V4(Ipv4Addr::UNSPECIFIED), config.vnc_port);
    let idle_timeout = LbDuration::from_secs(config.idle_timeout_secs);
    let stuck_timeout = LbDuration::from_secs(config.stuck_send_timeout_secs);

    let serial = Rc::new(RefCell::new(SerialBridge::bind_with_timeouts(
        loopback,
        &mut reactor,
        PIPE_CHANNEL,
        idle_timeout,
        stuck_timeout,
    )?));
    let vnc = Rc::new(RefCell::new(VncBridge::bind_with_timeouts(
        vnc_addr,
        &mut reactor,
        HID_CHANNEL,
        idle_timeout,
        stuck_timeout,
    )?));
    let serial_listen_token = serial.borrow().listen_token();
    let vnc_listen_token = vnc.borrow().listen_token();

    let mut tlv = Tlv::new();
    {
        let serial = serial.clone();
        tlv.register_handler(PIPE_CHANNEL, Box::new(move |ch, payload| serial.borrow_mut().on_inbound(ch, payload)))
            .expect("PIPE_CHANNEL is within TLV_MAX_HANDLERS");
    }
    {
        let serial = serial.clone();
        tlv.register_handler(DEBUG_CHANNEL, Box::new(move |ch, payload| serial.borrow_mut().on_inbound(ch, payload)))
            .expect("DEBUG_CHANNEL is within TLV_MAX_HANDLERS");
    }

    info!(serial_port = config.serial_port, vnc_port = config.vnc_port, "bridge listening");

    while running.load(Ordering::Relaxed) {
        let mut serial_acceptable = false;
        let mut vnc_acceptable = false;
        // Accept can't run inside this closure: it needs `&mut reactor`,
        // which `poll_with` already holds for the duration of the call.
        // Readable events for existing connections don't need the reactor,
        // so those are handled inline; listener readiness is just recorded.
        reactor.poll_with(Some(REACTOR_POLL_TIMEOUT), |event| {
            if event.token() == serial_listen_token {
                serial_acceptable = true;
            } else if event.token() == vnc_listen_token {
                vnc_acceptable = true;
            } else {
                if let Err(e) = serial.borrow_mut().handle_event(event) {
                    warn!(error = %e, "serial connection event failed");
                }
                if let Err(e) = vnc.borrow_mut().handle_event(event) {
                    warn!(error = %e, "vnc connection event failed");
                }
            }
        })?;

        if serial_acceptable {
            if let Err(e) = serial.borrow_mut().accept(&mut reactor) {
                warn!(error = %e, "serial accept failed");
            }
        }
        if vnc_acceptable {
            if let Err(e) = vnc.borrow_mut().accept(&mut reactor) {
                warn!(error = %e, "vnc accept failed");
            }
        }

        tlv_poll_uart(&mut tlv, &mut port, UART_POLL_TIMEOUT, || {})?;

        if let Err(e) = serial.borrow_mut().drain(&mut tlv, &mut port) {
            warn!(error = %e, "serial drain failed");
        }
        if let Err(e) = vnc.borrow_mut().drain(&mut tlv, &mut port) {
            warn!(error = %e, "vnc drain failed");
        }
    }

    info!("shutdown requested, exiting");
    Ok(())
}

/// Installs a `ctrlc` handler that flips a shared flag on `SIGINT`/
/// `SIGTERM`; the run loop checks it once per iteration rather than being
/// interrupted mid-poll, keeping shutdown itself part of the cooperative
/// single-threaded flow (SPEC_FULL §5).
fn install_shutdown_handler() -> Result<Arc<AtomicBool>, AppError> {
    let running = Arc::new(AtomicBool::new(true));
    let flag = running.clone();
    ctrlc::set_handler(move || flag.store(false, Ordering::Relaxed))?;
    Ok(running)
}

#[cfg(test)]
mod tests {
    use linkbridge_tlv::LoopbackUart;

    use super::*;

    fn test_config(serial_port: u16, vnc_port: u16) -> Config {
        Config {
            device: None,
            baud: 115_200,
            serial_port,
            vnc_port,
            vnc_password: crate::config::DEFAULT_VNC_PASSWORD.to_string(),
            idle_timeout_secs: 300,
            stuck_send_timeout_secs: 10,
        }
    }

    /// Stops the loop after `n` iterations by flipping the flag once
    /// `poll_with` has spun past it, since `run_with_port` rechecks
    /// `running` only at the top of the loop.
    fn stop_after(n: u32) -> Arc<AtomicBool> {
        let flag = Arc::new(AtomicBool::new(true));
        let counter_flag = flag.clone();
        std::thread::spawn(move || {
            let poll_ms = REACTOR_POLL_TIMEOUT.as_millis() as u64;
            std::thread::sleep(StdDuration::from_millis(u64::from(n) * poll_ms));
            counter_flag.store(false, Ordering::Relaxed);
        });
        flag
    }

    #[test]
    fn run_loop_binds_both_listeners_and_exits_cleanly_on_shutdown() {
        let config = test_config(0, 0);
        let (uart, _peer) = LoopbackUart::pair();
        let running = stop_after(2);
        let result = run_with_port(config, uart, running);
        assert!(result.is_ok());
    }

    #[test]
    fn mismatched_vnc_password_does_not_fail_the_run() {
        let mut config = test_config(0, 0);
        config.vnc_password = "not-the-default".to_string();
        let (uart, _peer) = LoopbackUart::pair();
        let running = stop_after(1);
        assert!(run_with_port(config, uart, running).is_ok());
    }
}
