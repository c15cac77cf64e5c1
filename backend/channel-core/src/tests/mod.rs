mod helpers;
mod router;
