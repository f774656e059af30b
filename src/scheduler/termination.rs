//! Safra's token-ring termination detection
//!
//! Each machine counts the basic messages it has sent minus those it has
//! received, and turns black whenever it receives one. Machine 0 launches a
//! white token with count 0 around the ring `0 -> 1 -> .. -> n-1 -> 0`; every
//! machine forwards it only while passive, adding its count and blackening it
//! if the machine itself is black. Termination holds when the token returns
//! white, machine 0 is white, and the summed count is zero: then every machine
//! is passive and no basic message is in flight.

use crate::cluster::MachineId;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Token {
    pub count: i64,
    pub black: bool,
}

impl Token {
    fn fresh() -> Self {
        Token {
            count: 0,
            black: false,
        }
    }
}

/// What the machine should do after a poll
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Step {
    Idle,
    Forward { to: MachineId, token: Token },
    Terminated,
}

#[derive(Debug)]
pub struct TerminationDetector {
    machine: MachineId,
    num_machines: usize,
    received: i64,
    black: bool,
    holding: Option<Token>,
    /// Machine 0 only: a token is circulating
    probing: bool,
}

impl TerminationDetector {
    pub fn new(machine: MachineId, num_machines: usize) -> Self {
        Self {
            machine,
            num_machines,
            received: 0,
            black: false,
            holding: None,
            probing: false,
        }
    }

    /// A basic message arrived
    pub fn on_receive(&mut self) {
        self.received += 1;
        self.black = true;
    }

    /// The token arrived from the previous machine
    pub fn on_token(&mut self, token: Token) {
        self.holding = Some(token);
    }

    fn next(&self) -> MachineId {
        (self.machine + 1) % self.num_machines
    }

    fn launch(&mut self) -> Step {
        self.probing = true;
        self.black = false;
        Step::Forward {
            to: self.next(),
            token: Token::fresh(),
        }
    }

    /// Advance the protocol. `passive` means no local work is running or
    /// pending; `sent` is the number of basic messages sent so far.
    pub fn poll(&mut self, passive: bool, sent: i64) -> Step {
        if !passive {
            return Step::Idle;
        }
        let count = sent - self.received;

        if self.num_machines == 1 {
            return if count == 0 { Step::Terminated } else { Step::Idle };
        }

        if self.machine != 0 {
            return match self.holding.take() {
                Some(token) => {
                    let token = Token {
                        count: token.count + count,
                        black: token.black || self.black,
                    };
                    self.black = false;
                    Step::Forward {
                        to: self.next(),
                        token,
                    }
                }
                None => Step::Idle,
            };
        }

        match self.holding.take() {
            None if self.probing => Step::Idle,
            None => self.launch(),
            Some(token) => {
                self.probing = false;
                if !token.black && !self.black && token.count + count == 0 {
                    Step::Terminated
                } else {
                    self.launch()
                }
            }
        }
    }
}
