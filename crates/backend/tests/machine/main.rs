mod check;
mod create;
mod destroy;
mod helpers;
