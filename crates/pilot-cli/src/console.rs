use tracing::info;

use pilot_input::stick::{StickSurface, StickVector};
use pilot_link::safety;
use pilot_link::state::{ControlUpdate, FlightControls};
use pilot_link::tx::LinkTransmitter;

enum Side {
    Left,
    Right,
}

/// Maps operator console lines onto the control core: two virtual sticks,
/// the throttle slider, the arm switch, and session lifecycle events.
pub struct Console {
    left: StickSurface,
    right: StickSurface,
    controls: FlightControls,
    target: String,
}

impl Console {
    pub fn new(controls: FlightControls, target: String, width: u32, height: u32) -> Self {
        let mut left = StickSurface::from_view_size(width, height);
        {
            let controls = controls.clone();
            left.set_observer(move |v: StickVector| {
                controls.apply(ControlUpdate {
                    roll: Some(v.x),
                    pitch: Some(v.y),
                    ..Default::default()
                });
            });
        }

        let mut right = StickSurface::from_view_size(width, height);
        {
            let controls = controls.clone();
            right.set_observer(move |v: StickVector| {
                // the yaw stick only reads sideways, its y axis is unused
                controls.apply(ControlUpdate {
                    yaw: Some(v.x),
                    ..Default::default()
                });
            });
        }

        Self {
            left,
            right,
            controls,
            target,
        }
    }

    /// Handles one console line. Returns `false` when the session should end.
    pub async fn handle_line(&mut self, tx: &mut LinkTransmitter, line: &str) -> bool {
        let mut parts = line.split_whitespace();
        let Some(cmd) = parts.next() else {
            return true;
        };
        let args: Vec<&str> = parts.collect();

        match cmd {
            "left" => self.stick_cmd(Side::Left, &args),
            "right" => self.stick_cmd(Side::Right, &args),
            "throttle" => self.throttle_cmd(&args),
            "arm" => {
                self.controls.apply(ControlUpdate {
                    armed: Some(true),
                    ..Default::default()
                });
                info!("console: armed");
                self.print_readout();
            }
            "disarm" => {
                safety::disarm(&self.controls);
                self.print_readout();
            }
            "suspend" => {
                safety::on_session_suspended(&self.controls);
                self.print_readout();
            }
            "resume" => println!("session resumed; re-arm explicitly when ready"),
            "connect" => {
                if let Some(addr) = args.first() {
                    self.target = (*addr).to_string();
                }
                if tx.start(&self.target).await {
                    println!("link up: {}", self.target);
                } else {
                    println!("link start failed: {}", self.target);
                }
            }
            "disconnect" => {
                tx.stop().await;
                println!("link stopped");
            }
            "status" => self.print_status(tx),
            "help" => print_help(),
            "quit" | "exit" => return false,
            other => println!("unknown command '{}'; 'help' lists commands", other),
        }
        true
    }

    fn stick_cmd(&mut self, side: Side, args: &[&str]) {
        let surface = match side {
            Side::Left => &mut self.left,
            Side::Right => &mut self.right,
        };
        match args {
            ["up"] => {
                surface.release();
                self.print_readout();
            }
            [px, py] => {
                let (Ok(px), Ok(py)) = (px.parse::<f32>(), py.parse::<f32>()) else {
                    println!("usage: left|right <px> <py> | left|right up");
                    return;
                };
                if surface.track(px, py).is_none() {
                    println!("stick surface has no size yet");
                    return;
                }
                self.print_readout();
            }
            _ => println!("usage: left|right <px> <py> | left|right up"),
        }
    }

    fn throttle_cmd(&mut self, args: &[&str]) {
        let Some(Ok(pct)) = args.first().map(|s| s.parse::<u8>()) else {
            println!("usage: throttle <percent 0-100>");
            return;
        };
        self.controls.apply(ControlUpdate {
            throttle: Some(pct),
            ..Default::default()
        });
        self.print_readout();
    }

    fn print_readout(&self) {
        let st = self.controls.snapshot();
        println!(
            "roll={:+.2} | pitch={:+.2} | yaw={:+.2} | throttle={}% | {}",
            st.roll,
            st.pitch,
            st.yaw,
            st.throttle,
            if st.armed { "ARMED" } else { "DISARMED" }
        );
    }

    fn print_status(&self, tx: &LinkTransmitter) {
        self.print_readout();
        let stats = tx.stats();
        println!("link: connected={} target={:?}", tx.is_connected(), tx.target());
        println!(
            "frames sent={} failures={} consecutive={}",
            stats.frames_sent, stats.send_failures, stats.consecutive_failures
        );
    }
}

fn print_help() {
    println!("left|right <px> <py>   move a stick to a pointer position");
    println!("left|right up          release a stick (snaps back to center)");
    println!("throttle <pct>         set throttle percent");
    println!("arm | disarm           arm switch (disarm also zeroes throttle)");
    println!("suspend | resume       simulate the app losing/regaining foreground");
    println!("connect [addr]         (re)start streaming, optionally to a new target");
    println!("disconnect             stop streaming");
    println!("status                 controls, link state, session counters");
    println!("quit                   end the session");
}
