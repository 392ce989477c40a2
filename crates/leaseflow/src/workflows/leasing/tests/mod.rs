mod common;
mod routing;
mod transitions;
mod unit_of_work;
