//! Adapters: concrete implementations of the hexagonal port traits.
//!
//! | Adapter          | Implements   | Connects to                        |
//! |------------------|--------------|------------------------------------|
//! | `gpio_relays`    | RelayPort    | `embedded-hal` output pins         |
//! | `time`           | Clock        | `std::time::Instant`               |
//! | `log_sink`       | EventSink    | `log` facade                       |
//! | `backend_worker` | (drives)     | any [`Backend`](crate::app::ports::Backend) |

pub mod backend_worker;
pub mod gpio_relays;
pub mod log_sink;
pub mod time;
